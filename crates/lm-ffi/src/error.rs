use std::cell::RefCell;
use std::ffi::CString;

use lm_scorer::ScorerError;

use crate::types::LMStatus;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message for later retrieval via `lm_last_error`.
pub fn set_last_error(msg: String) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

/// Record `err` and map it to the status code reported to C callers.
pub fn report(err: ScorerError) -> LMStatus {
    let status = match &err {
        ScorerError::Load { .. } => LMStatus::ErrorModelLoad,
        ScorerError::NotLoaded => LMStatus::ErrorNotLoaded,
        ScorerError::Runtime(_) => LMStatus::ErrorStep,
        e if e.is_caller_error() => LMStatus::ErrorInvalidArgument,
        _ => LMStatus::ErrorInternal,
    };
    set_last_error(err.to_string());
    status
}
