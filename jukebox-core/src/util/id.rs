use crossbeam::atomic::AtomicCell;

static HANDLE_COUNTER: AtomicCell<u64> = AtomicCell::new(1);

/// Returns a number no other handle in this process has received.
pub fn next_handle() -> u64 {
    HANDLE_COUNTER.fetch_add(1)
}

/// Declares a copyable id for in-memory handles such as listeners and subscriptions.
///
/// Ids are unique within the process and are never persisted.
#[macro_export]
macro_rules! handle_id {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis struct $name(u64);

        impl $name {
            pub fn new() -> Self {
                Self($crate::next_handle())
            }

            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    crate::handle_id! {
        struct TestId;
    }

    #[test]
    fn handles_are_unique() {
        let a = TestId::new();
        let b = TestId::new();

        assert_ne!(a, b);
        assert!(b.value() > a.value());
        assert_eq!(a.to_string(), format!("#{}", a.value()));
    }
}
