//! Bearer-token acquisition for call setup.

mod token;

pub use token::{
    provider_from_config, AuthToken, CachedTokenProvider, HttpTokenProvider, TokenError,
    TokenProvider,
};
