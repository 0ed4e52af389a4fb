#[cfg(feature = "std")]
use conquer_once::OnceCell;
#[cfg(not(feature = "std"))]
use conquer_once::spin::OnceCell;

const DEFAULT_UPDATE_THRESHOLD: u32 = 100;

/// The global configuration cell.
///
/// May be initialized at most once, before the first thread touches the
/// reclamation engine; threads snapshot it when their participant state is
/// created, so a late initialization is only picked up by threads spawned
/// afterwards. If it is never initialized, [`Config::default`] applies.
pub static CONFIG: OnceCell<Config> = OnceCell::uninit();

/// Runtime configuration for the reclamation engine.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    update_threshold: u32,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Creates a new [`Config`] with the default update threshold.
    #[inline]
    pub const fn new() -> Self {
        Self { update_threshold: DEFAULT_UPDATE_THRESHOLD }
    }

    /// Creates a new [`Config`] with the given update threshold.
    ///
    /// A thread attempts to advance the global epoch on every
    /// `(update_threshold + 1)`-th critical-section entry that observes an
    /// unchanged epoch, so 0 means "attempt on every entry".
    #[inline]
    pub const fn with_update_threshold(update_threshold: u32) -> Self {
        Self { update_threshold }
    }

    /// Returns the configured update threshold.
    #[inline]
    pub fn update_threshold(self) -> u32 {
        self.update_threshold
    }
}

/// A builder for [`Config`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfigBuilder {
    update_threshold: Option<u32>,
}

impl ConfigBuilder {
    /// Creates a new [`ConfigBuilder`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the update threshold.
    #[inline]
    pub fn update_threshold(mut self, update_threshold: u32) -> Self {
        self.update_threshold = Some(update_threshold);
        self
    }

    /// Builds the [`Config`], substituting defaults for unset values.
    #[inline]
    pub fn build(self) -> Config {
        Config {
            update_threshold: self.update_threshold.unwrap_or(DEFAULT_UPDATE_THRESHOLD),
        }
    }
}
