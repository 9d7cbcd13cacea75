//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep process IDs from being mixed up with
//! addresses or other integers in function signatures.

use std::fmt;

/// A virtual address, either in a process/kernel address space or in an
/// object file's link-time address space.
pub type Addr = u64;

/// Process ID
///
/// `Pid(0)` designates the calling process itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl Pid {
    /// The calling process.
    pub const SELF: Pid = Pid(0);

    /// Returns true if this refers to the calling process
    #[must_use]
    pub fn is_self(self) -> bool {
        self.0 == 0
    }

    /// Path component used under `/proc` for this process
    #[must_use]
    pub fn proc_component(self) -> String {
        if self.is_self() {
            "self".to_string()
        } else {
            self.0.to_string()
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_self() {
            write!(f, "PID:self")
        } else {
            write!(f, "PID:{}", self.0)
        }
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Pid(pid)
    }
}

impl From<Pid> for u32 {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
        assert_eq!(Pid::SELF.to_string(), "PID:self");
    }

    #[test]
    fn test_pid_proc_component() {
        assert_eq!(Pid(42).proc_component(), "42");
        assert_eq!(Pid(0).proc_component(), "self");
    }
}
