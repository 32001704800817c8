mod context;
mod error;
mod types;

pub use context::*;
pub use error::*;
pub use types::*;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::AssertUnwindSafe;

use lm_scorer::SpecialLabels;

/// Execute a closure that returns an `LMStatus`, catching any panics
/// and converting them into `LMStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> LMStatus>(f: F) -> LMStatus {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            LMStatus::ErrorInternal
        }
    }
}

/// Convert a C label to a vocabulary index, rejecting negatives.
fn to_label(value: i32, what: &str) -> Result<u32, LMStatus> {
    u32::try_from(value).map_err(|_| {
        set_last_error(format!("{} must be non-negative, got {}", what, value));
        LMStatus::ErrorInvalidArgument
    })
}

fn create(labels: SpecialLabels, scorer_out: *mut *mut LMScorer) -> LMStatus {
    if scorer_out.is_null() {
        set_last_error("scorer_out is null".to_string());
        return LMStatus::ErrorInvalidArgument;
    }
    let scorer = Box::new(LMScorer::new(labels));
    unsafe {
        *scorer_out = Box::into_raw(scorer);
    }
    LMStatus::Ok
}

/// Create an unloaded scorer with the default reserved labels (99).
///
/// On success, writes a heap-allocated `LMScorer` pointer into `*scorer_out`.
/// The caller must later call `lm_scorer_destroy` to free it.
#[no_mangle]
pub extern "C" fn lm_scorer_create(scorer_out: *mut *mut LMScorer) -> LMStatus {
    catch_panic(|| create(SpecialLabels::default(), scorer_out))
}

/// Create an unloaded scorer with custom reserved labels.
#[no_mangle]
pub extern "C" fn lm_scorer_create_with_labels(
    labels: LMSpecialLabels,
    scorer_out: *mut *mut LMScorer,
) -> LMStatus {
    catch_panic(|| {
        let labels = match (
            to_label(labels.sos, "sos"),
            to_label(labels.eos, "eos"),
            to_label(labels.start, "start"),
        ) {
            (Ok(sos), Ok(eos), Ok(start)) => SpecialLabels { sos, eos, start },
            _ => return LMStatus::ErrorInvalidArgument,
        };
        create(labels, scorer_out)
    })
}

/// Destroy a scorer previously created by `lm_scorer_create`.
///
/// Passing a null pointer is a no-op and returns `LMStatus::Ok`. States
/// obtained from the scorer stay valid and must be destroyed separately.
#[no_mangle]
pub unsafe extern "C" fn lm_scorer_destroy(scorer: *mut LMScorer) -> LMStatus {
    if scorer.is_null() {
        return LMStatus::Ok;
    }
    drop(Box::from_raw(scorer));
    LMStatus::Ok
}

/// Load a recurrent LM from a GGUF file using `num_threads` compute lanes.
///
/// On failure the scorer stays unloaded. Loading twice is rejected.
#[no_mangle]
pub unsafe extern "C" fn lm_scorer_load(
    scorer: *mut LMScorer,
    model_path: *const c_char,
    num_threads: i32,
) -> LMStatus {
    catch_panic(|| {
        if scorer.is_null() || model_path.is_null() {
            set_last_error("null argument".to_string());
            return LMStatus::ErrorInvalidArgument;
        }
        if num_threads <= 0 {
            set_last_error(format!("num_threads must be positive, got {}", num_threads));
            return LMStatus::ErrorInvalidArgument;
        }
        let scorer = unsafe { &mut *scorer };
        let path = match unsafe { CStr::from_ptr(model_path) }.to_str() {
            Ok(s) => s,
            Err(e) => {
                set_last_error(format!("invalid path: {}", e));
                return LMStatus::ErrorInvalidArgument;
            }
        };

        match scorer.scorer.load(path, num_threads as usize) {
            Ok(()) => LMStatus::Ok,
            Err(e) => report(e),
        }
    })
}

/// Write the label to use as `prev_label` on the first step into `*label_out`.
#[no_mangle]
pub unsafe extern "C" fn lm_scorer_start(scorer: *const LMScorer, label_out: *mut i32) -> LMStatus {
    catch_panic(|| {
        if scorer.is_null() || label_out.is_null() {
            set_last_error("null argument".to_string());
            return LMStatus::ErrorInvalidArgument;
        }
        let scorer = unsafe { &*scorer };
        let start = scorer.scorer.start();
        match i32::try_from(start) {
            Ok(label) => {
                unsafe { *label_out = label };
                LMStatus::Ok
            }
            Err(_) => {
                set_last_error(format!("start label {} does not fit in a C int", start));
                LMStatus::ErrorInvalidArgument
            }
        }
    })
}

/// Create the zero state of the loaded model.
///
/// The caller must later call `lm_state_destroy` to free it.
#[no_mangle]
pub unsafe extern "C" fn lm_state_zero(
    scorer: *const LMScorer,
    state_out: *mut *mut LMState,
) -> LMStatus {
    catch_panic(|| {
        if scorer.is_null() || state_out.is_null() {
            set_last_error("null argument".to_string());
            return LMStatus::ErrorInvalidArgument;
        }
        let scorer = unsafe { &*scorer };
        match scorer.scorer.zero_state() {
            Ok(tensor) => {
                unsafe { *state_out = Box::into_raw(Box::new(LMState { tensor })) };
                LMStatus::Ok
            }
            Err(e) => report(e),
        }
    })
}

/// Destroy a state. Passing a null pointer is a no-op.
#[no_mangle]
pub unsafe extern "C" fn lm_state_destroy(state: *mut LMState) -> LMStatus {
    if state.is_null() {
        return LMStatus::Ok;
    }
    drop(Box::from_raw(state));
    LMStatus::Ok
}

fn step_impl(
    scorer: *const LMScorer,
    state: *const LMState,
    prev_label: i32,
    label: Option<i32>,
    score_out: *mut f32,
    next_out: *mut *mut LMState,
) -> LMStatus {
    if scorer.is_null() || state.is_null() || score_out.is_null() || next_out.is_null() {
        set_last_error("null argument".to_string());
        return LMStatus::ErrorInvalidArgument;
    }
    let scorer = unsafe { &*scorer };
    let state = unsafe { &*state };
    let prev_label = match to_label(prev_label, "prev_label") {
        Ok(l) => l,
        Err(status) => return status,
    };

    let result = match label {
        Some(label) => match to_label(label, "label") {
            Ok(l) => scorer.scorer.step(&state.tensor, prev_label, l),
            Err(status) => return status,
        },
        None => scorer.scorer.step_eos(&state.tensor, prev_label),
    };
    match result {
        Ok((score, next)) => {
            unsafe {
                *score_out = score;
                *next_out = Box::into_raw(Box::new(LMState { tensor: next }));
            }
            LMStatus::Ok
        }
        Err(e) => report(e),
    }
}

/// Score `label` following `prev_label` from `state`.
///
/// Writes the natural-log probability into `*score_out` and a new state
/// into `*next_out`; `state` is left unchanged. The caller owns the new
/// state and must free it with `lm_state_destroy`.
#[no_mangle]
pub unsafe extern "C" fn lm_scorer_step(
    scorer: *const LMScorer,
    state: *const LMState,
    prev_label: i32,
    label: i32,
    score_out: *mut f32,
    next_out: *mut *mut LMState,
) -> LMStatus {
    catch_panic(|| step_impl(scorer, state, prev_label, Some(label), score_out, next_out))
}

/// Same as `lm_scorer_step` with the end-of-sentence label.
#[no_mangle]
pub unsafe extern "C" fn lm_scorer_step_eos(
    scorer: *const LMScorer,
    state: *const LMState,
    prev_label: i32,
    score_out: *mut f32,
    next_out: *mut *mut LMState,
) -> LMStatus {
    catch_panic(|| step_impl(scorer, state, prev_label, None, score_out, next_out))
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error on this
/// thread, or null if there is none. The caller must free the returned
/// string with `lm_free_string`.
#[no_mangle]
pub extern "C" fn lm_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `lm_last_error`.
#[no_mangle]
pub unsafe extern "C" fn lm_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
