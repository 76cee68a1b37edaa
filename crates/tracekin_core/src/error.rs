use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Structural errors surfaced while building a model from its inputs.
///
/// Every variant is fatal and is reported before any simulation time is
/// consumed; there is no recovery path at this layer.
#[derive(Error, Debug)]
pub enum ModelError {
    /// An organ record does not supply a parameter its class's assembly
    /// rule consumes.
    #[error("organ `{organ}` ({class}) is missing required parameter `{param}`")]
    MissingParameter {
        organ: String,
        class: &'static str,
        param: &'static str,
    },

    /// The vessel class must contain exactly the artery and the vein,
    /// in that order.
    #[error("expected exactly two vessel compartments (artery then vein), found {found}")]
    VesselCount { found: usize },

    /// Organ names key the registry and must be unique across classes.
    #[error("duplicate organ name `{0}`")]
    DuplicateOrgan(String),

    /// An organ routes its outflow through an organ that does not exist.
    #[error("organ `{organ}` drains into unknown organ `{target}`")]
    UnknownDrainTarget { organ: String, target: String },

    /// The initial load table names an organ absent from the registry.
    #[error("initial load names unknown organ `{0}`")]
    UnknownLoadOrgan(String),

    /// The initial load table names a state variable the organ's class
    /// does not have.
    #[error("initial load for `{organ}` names unknown offset `{offset}`")]
    UnknownLoadOffset { organ: String, offset: String },

    /// A dose profile fails basic sanity checks (empty schedule,
    /// inverted interval, ...).
    #[error("invalid dose profile: {0}")]
    InvalidDoseProfile(String),
}
