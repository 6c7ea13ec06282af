//! # polyrestreamer - Client du service Restreamer
//!
//! Cette crate gère la connexion authentifiée à un serveur Restreamer:
//!
//! - [`Session`]: credentials, tokens, refresh et backoff des logins
//! - [`Transport`]: contrat du service distant, avec [`HttpTransport`]
//!   (REST/JSON via `ureq`) et [`MemoryTransport`] (simulation en mémoire)
//! - [`Clock`]: source de temps injectable
//!
//! Tous les secrets (mot de passe, tokens, clés de stream dans les URL)
//! sont conservés dans des `Zeroizing<String>` et effacés à la libération.
//!
//! ## Exemple
//!
//! ```no_run
//! use polyrestreamer::{ConnectionSettings, Session};
//!
//! let settings = ConnectionSettings::new("localhost", 8080).with_credentials("admin", "secret");
//! let mut session = Session::connect(settings);
//! session.login()?;
//! for process in session.list_processes()? {
//!     println!("{} [{}] {}", process.id, process.reference, process.state);
//! }
//! # Ok::<(), polyrestreamer::RestreamerError>(())
//! ```

pub mod clock;
pub mod config_ext;
pub mod error;
pub mod http;
pub mod memory;
pub mod models;
pub mod session;
pub mod settings;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock, unix_seconds};
pub use config_ext::RestreamerConfigExt;
pub use error::{RestreamerError, Result};
pub use http::HttpTransport;
pub use memory::{MemoryTransport, Operation};
pub use models::{
    AuthTokens, ProcessCommand, ProcessConfig, ProcessInfo, ProcessOutput, SecretString,
};
pub use session::{BASE_LOGIN_BACKOFF, Session};
pub use settings::ConnectionSettings;
pub use transport::Transport;
