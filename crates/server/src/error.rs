#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to bind to the listen address: {0}")]
    Bind(std::io::Error),
    #[error("Server error: {0}")]
    Server(std::io::Error),
}
