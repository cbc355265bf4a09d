pub type ScenefxResult<T> = Result<T, ScenefxError>;

#[derive(thiserror::Error, Debug)]
pub enum ScenefxError {
    #[error("render error: {0}")]
    Render(String),

    #[error("filter error: {0}")]
    Filter(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScenefxError {
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn filter(msg: impl Into<String>) -> Self {
        Self::Filter(msg.into())
    }

    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }
}
