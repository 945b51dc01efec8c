//! Client SDK for the Toastate cloud.
//!
//! Start from a [`Session`]: it signs users in, manages toasters and custom
//! domains, and streams code uploads as multipart bodies without buffering
//! them (see [`upload`]).

pub mod apiclient;
pub mod cli;
pub mod config;
pub mod contract;
pub mod custom_domains;
pub mod error;
pub mod load_config;
pub mod models;
pub mod session;
pub mod toaster;
pub mod transport;
pub mod upload;
pub mod user;

pub use apiclient::{Access, ApiClient, UploadMethod};
pub use config::ClientConfig;
pub use contract::{Transport, TransportError, TransportRequest, TransportResponse};
pub use error::{ApiError, ToastateError, UploadError};
pub use session::Session;
pub use toaster::{CodeSource, CreateToasterInput, GitSource, ToasterDeployment, UpdateToasterInput};
pub use upload::{upload_queue, UploadItem, UploadQueue, UploadSender};
