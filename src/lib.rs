pub mod align;
pub mod beats;
pub mod catalog;
pub mod config;
pub mod error;
pub mod files;
pub mod index;
pub mod mix;
pub mod reader;
pub mod render;
pub mod select;
pub mod session;
pub mod stretch;
pub mod tempo;
pub mod types;

pub use catalog::StemCatalog;
pub use config::{FitPolicy, MixConfig};
pub use error::{AttemptError, CatalogError, SessionError};
pub use session::{MixtureSession, SessionReport};
pub use types::{Mixture, SampleBuffer, SoundClass, StemRecord};
