mod password;
pub use password::{hash_password, verify_password};
mod jwt;
pub use jwt::{SESSION_TTL_HOURS, UserClaims, generate_token, process_token, session_claims};
mod token;
pub use token::{generate_code, generate_secret};
mod signature;
pub use signature::{secret_matches, sign_hex, verify_hex};
mod error;
pub use error::{CryptError, CryptResult};
