//! Authentication against the identity provider.
//!
//! A refresh secret stored in the credential file is exchanged for
//! short-lived bearer tokens. Tokens are cached by [`TokenProvider`].

mod credentials;
mod provider;
mod token;

pub use credentials::{CredentialStore, Credentials};
pub use provider::{HttpTokenSource, TokenProvider, TokenSource};
pub use token::{is_fresh, AuthToken, TokenResponse};

#[cfg(test)]
pub use provider::MockTokenSource;
