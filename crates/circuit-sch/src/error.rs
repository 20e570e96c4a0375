use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    /// The renderer failed; `message` carries its diagnostic text.
    #[error("schematic rendering failed: {message}")]
    Engine { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
