use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File {file_id} is not part of this upload")]
    RecordNotFound { file_id: String },

    #[error("Upload service has shut down")]
    ServiceClosed,

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, UploadError>;
