use thiserror::Error;

use crate::model::{DocumentError, IdError, PageError};
use crate::resume::ResumeError;
use crate::session::DocumentSessionError;
use crate::settings::SettingsError;

/// Any domain error, for callers that do not care which layer raised it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Resume(#[from] ResumeError),
    #[error(transparent)]
    Session(#[from] DocumentSessionError),
}
