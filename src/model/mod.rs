use thiserror::Error;

pub mod pin;
pub mod venvs;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading configuration toml: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("In pyproject.toml, expecting sections [[tool.venvs]]. Create them")]
    MissingVenvs,
    #[error("Missing TOML key `{0}` while parsing [[tool.venvs]]")]
    MissingKey(String),
    #[error("In [[tool.venvs]] for venv `{0}`, expecting field reqs to be a sequence of str")]
    ReqsNotSequence(String),
}
