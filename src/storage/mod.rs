//! Permanent Storage
//!
//! Best-effort persistence of generation results: an object-store seam
//! with an HTTP gateway client, and the retry sweep that recovers uploads
//! the request path could not complete.

pub mod object_store;
pub mod sweep;

pub use object_store::{HttpObjectStorage, LocalDirStorage, ObjectStorage, StorageError};
pub use sweep::{
    HttpFetcher, PendingUpload, ResultFetcher, SweepReport, UploadQueue, UploadSweeper,
};
