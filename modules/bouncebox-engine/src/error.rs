use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Dispatcher not found for exchange {0:?}")]
    DispatcherNotFound(String),

    #[error("Cannot bind {key} on the {exchange} exchange")]
    ExchangeMismatch { exchange: &'static str, key: String },

    #[error("Component {0} is already attached")]
    AlreadyAttached(String),

    #[error("Component {id} already owns {children} children; attach leaves before building on them")]
    PopulatedSubtree { id: String, children: usize },

    #[error("Component {0} cannot be attached to itself")]
    SelfAttach(String),

    #[error("Middleware {0} only accepts children through add_child")]
    PlainChildOnMiddleware(String),

    #[error("Middleware {id} already has a {direction} filter")]
    FilterSlotTaken { id: String, direction: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Handler(anyhow::Error),
}

impl BusError {
    /// True for errors raised by the bus itself rather than by a callback.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, BusError::Handler(_))
    }
}

/// Callback errors surface as `anyhow::Error`. A `BusError` that travelled through a
/// callback (e.g. a nested router failing) is unwrapped instead of wrapped twice.
impl From<anyhow::Error> for BusError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<BusError>() {
            Ok(bus) => bus,
            Err(other) => BusError::Handler(other),
        }
    }
}

pub type Result<T, E = BusError> = std::result::Result<T, E>;
