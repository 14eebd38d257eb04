//! Instrument catalog port.

use crate::domain::error::BacktestError;
use crate::domain::instrument::{Instrument, resolve_identifier};

pub trait InstrumentCatalog: Send + Sync {
    /// Every instrument the catalog knows, in a stable order.
    fn list_all(&self) -> Result<Vec<Instrument>, BacktestError>;

    /// Resolve a FIGI or ticker. Fails with `UnknownInstrument` or
    /// `AmbiguousInstrument`.
    fn resolve(&self, identifier: &str) -> Result<Instrument, BacktestError> {
        resolve_identifier(&self.list_all()?, identifier)
    }
}
