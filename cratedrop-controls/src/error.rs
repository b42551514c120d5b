use snafu::prelude::*;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to seek"))]
    Seek,
    #[snafu(display("No track loaded"))]
    NotLoaded,
    #[snafu(display("{message}"))]
    Client { message: String },
    #[snafu(display("Credentials rejected by server"))]
    Unauthorized,
    #[snafu(display("{message}"))]
    StreamError { message: String },
}

impl From<rodio::source::SeekError> for Error {
    fn from(_: rodio::source::SeekError) -> Self {
        Error::Seek
    }
}

impl From<rodio::StreamError> for Error {
    fn from(value: rodio::StreamError) -> Self {
        Self::StreamError {
            message: value.to_string(),
        }
    }
}

impl From<rodio::decoder::DecoderError> for Error {
    fn from(value: rodio::decoder::DecoderError) -> Self {
        Self::StreamError {
            message: value.to_string(),
        }
    }
}

impl From<cratedrop_client::Error> for Error {
    fn from(value: cratedrop_client::Error) -> Self {
        match value {
            cratedrop_client::Error::Unauthorized => Error::Unauthorized,
            other => Error::Client {
                message: other.to_string(),
            },
        }
    }
}
