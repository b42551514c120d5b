use snafu::prelude::*;

pub mod client;

pub use client::{Client, TrackQuery};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("{message}"))]
    Api { message: String },
    #[snafu(display("{message}"))]
    DeserializeJSON { message: String },
    #[snafu(display("Invalid server url: {message}"))]
    ServerUrl { message: String },
    #[snafu(display("Login failed"))]
    Login,
    #[snafu(display("Unable to refresh credentials: {message}"))]
    Refresh { message: String },
    #[snafu(display("Credentials rejected by server"))]
    Unauthorized,
    #[snafu(display("{message}"))]
    Http { message: String },
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Http {
            message: error.to_string(),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::ServerUrl {
            message: error.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
