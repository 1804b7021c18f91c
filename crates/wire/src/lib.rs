//! Wire-facing types shared by the auth and game planes: identity
//! providers, JWT claims, response/request codes, and the protobuf login
//! payload. Gameplay payloads past the request code stay opaque byte
//! slices, per the core's scope.

mod claims;
mod codes;
mod idp;
mod proto;

pub use claims::AuthClaims;
pub use codes::{RequestCode, ResponseCode};
pub use idp::{Idp, IdpRegistry, UnknownIdp};
pub use proto::LoginSuccessPayload;
