#![allow(unused_macros)]

// Poisoned guards are recovered, not propagated.

/// Helper macro for locking items
///
/// ```rust, ignore
///  let mut state = lock!(record.init_state);
///  *state = InitState::Initialized;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let slots = read_lock!(storage.slots);
///  println!("{}", slots.len());
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut slots = write_lock!(storage.slots);
///  slots[0] = Value::Int(42);
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}
