// crates/yggdrasil-core/src/lib.rs
// ============================================================================
// Module: Yggdrasil Core Library
// Description: Public API surface for the Yggdrasil authorization harness core.
// Purpose: Expose identity, policy, envelope, token, and fixture types.
// Dependencies: crate::{envelope, factory, identity, policy, services, token}
// ============================================================================

//! ## Overview
//! Yggdrasil core holds the I/O-free half of the authorization harness: the
//! role model, the expected authorization matrix, the response envelope
//! decoder, structural token inspection, and the test data factory. Crates
//! that talk to live services build on these types.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod envelope;
pub mod factory;
pub mod identity;
pub mod policy;
pub mod services;
pub mod token;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use envelope::Envelope;
pub use envelope::EnvelopeError;
pub use envelope::ErrorEnvelope;
pub use envelope::decode_envelope;
pub use factory::FactoryError;
pub use factory::NewUser;
pub use factory::TEST_EMAIL_DOMAIN;
pub use factory::TestDataFactory;
pub use identity::Profile;
pub use identity::Role;
pub use identity::TestUser;
pub use identity::TestUserSet;
pub use identity::UserId;
pub use policy::Access;
pub use policy::AccessRule;
pub use policy::ContentStatus;
pub use policy::ENDPOINTS;
pub use policy::Endpoint;
pub use policy::EndpointId;
pub use policy::Expectation;
pub use policy::HttpMethod;
pub use policy::MatrixRow;
pub use policy::PolicyError;
pub use policy::Principal;
pub use policy::Visibility;
pub use policy::authorize;
pub use policy::baseline_endpoints;
pub use policy::can_view;
pub use policy::escalation_expectation;
pub use policy::expected_matrix;
pub use policy::read_expectation;
pub use services::HEALTH_PATH;
pub use services::ServiceName;
pub use token::TokenClaims;
pub use token::TokenError;
pub use token::is_token_valid;
pub use token::role_from_token;
