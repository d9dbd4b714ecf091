use logfollower_model::Tick;

/// The required response headers of the transport contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkHeaders {
    /// `x-last-included-tick` — largest tick included in this chunk,
    /// `Tick(0)` if the chunk was empty.
    pub last_included_tick: Tick,
    /// `x-last-tick` — master's current tip tick.
    pub last_tick: Tick,
    /// `x-check-more` — true iff more log is immediately available.
    pub check_more: bool,
    /// `x-from-present` — true iff the requested `fromTick` was still
    /// retained by the master.
    pub from_present: bool,
    /// `x-active` — true iff the master's replication service is
    /// enabled.
    pub active: bool,
}
