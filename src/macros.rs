#![allow(unused_macros)]

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let assemblies = read_lock!(self.assemblies);
///  println!("{}", assemblies.len());
/// ```
macro_rules! read_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock.read().expect("Failed to acquire read lock")
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut assemblies = write_lock!(self.assemblies);
///  assemblies.clear();
/// ```
macro_rules! write_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock.write().expect("Failed to acquire write lock")
    };
}
