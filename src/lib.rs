//! Client-side plumbing for the MonetDB wire protocol: connection-target
//! resolution and the `COPY ... ON CLIENT` bulk transfer protocol.
//!
//! Connection parameters accumulate in a [`Target`] from whatever sources
//! apply (defaults, URLs, individual assignments) and are checked as a whole
//! by [`Target::validate`], which yields an immutable [`Validated`] plan
//! describing how to connect. Bulk transfers are driven by a
//! [`TransferCoordinator`] dispatching server requests to user-supplied
//! handlers.
//!
//! ```no_run
//! use mapi_stream::{parse_url, Target};
//!
//! let mut target = Target::new();
//! parse_url(&mut target, "monetdbs://db.example.com:50001/demo?user=alice")?;
//! let plan = target.validate()?;
//! assert!(plan.connect_tls());
//! assert_eq!("db.example.com", plan.connect_tcp());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod parameter;
pub mod target;
pub mod transfer;
pub mod url;
pub mod validate;
pub mod wire;

pub use error::{ParseError, TransferError, ValidationError};
pub use parameter::{Parameter, ParameterType, Value};
pub use target::Target;
pub use transfer::{
    Charset, Download, DownloadHandler, NormalizeCrLf, TransferCoordinator, TransferOutcome,
    TransferRequest, Upload, UploadHandler,
};
pub use url::parse_url;
pub use validate::{TlsVerifyMode, Validated, DEFAULT_PORT};
pub use wire::{BlockStream, MessageWire, MAX_BLOCK_PAYLOAD};
