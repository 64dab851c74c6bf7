mod credentials;
mod error;
mod filer;

pub use credentials::{PhysioNetCredentials, PASSWORD_ENV, USERNAME_ENV};
pub use error::FilerError;
pub use filer::{ImaGenomeFiler, MimicCxrFiler, PreparedMarker};
