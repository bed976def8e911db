cfg_if::cfg_if! {
    if #[cfg(feature = "threading")] {
        pub use parking_lot::{Mutex, MutexGuard};
        pub use once_cell::sync::{Lazy, OnceCell};
    } else {
        mod cell_lock;

        pub type Mutex<T> = lock_api::Mutex<cell_lock::RawCellMutex, T>;
        pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, cell_lock::RawCellMutex, T>;
        pub use once_cell::unsync::{Lazy, OnceCell};
    }
}
