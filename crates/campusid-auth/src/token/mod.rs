//! Token issuance: signing keys, claim assembly, JWKS publication.

pub mod issuer;
pub mod jwt;

pub use issuer::{IssueRequest, IssuedToken, TokenIssuer};
pub use jwt::{Jwk, Jwks, JwtError, SigningAlgorithm, SigningKeyPair, TokenKind, TokenSigner};
