/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LMStatus {
    Ok = 0,
    /// Null pointer, negative label, non-positive thread count or a call
    /// the scorer's current state does not allow.
    ErrorInvalidArgument = 1,
    ErrorModelLoad = 2,
    ErrorNotLoaded = 3,
    ErrorStep = 4,
    ErrorInternal = 5,
}

/// Reserved label identifiers, as passed to `lm_scorer_create_with_labels`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LMSpecialLabels {
    pub sos: i32,
    pub eos: i32,
    pub start: i32,
}
