//! Publishing artifacts to the app catalog.
//!
//! [`CatalogUploader`] drives a whole push. [`CatalogClient`] performs a
//! single upload attempt and [`decide`] tells the uploader whether to try
//! again.

mod client;
mod response;
mod retry;
mod uploader;


pub use client::{
    CatalogClient, UploadRequest, APP_NAME_HEADER, CONTENT_MD5_HEADER, CONTENT_SHA256_HEADER,
    SESSION_ID_HEADER,
};
pub use response::{CatalogResponse, UPLOAD_RELATION};
pub use retry::{
    decide, AttemptOutcome, BackoffStrategy, JitterStrategy, PushAttempt, RetryConfig,
    RetryDecision,
};
pub use uploader::CatalogUploader;
