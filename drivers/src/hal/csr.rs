//! Control/Status Register access.

use core::fmt;

/// Byte offset of a 64-bit register inside a device's CSR space.
pub type CsrAddr = u64;

/// CSR access errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrError {
    /// Address is outside the mapped window
    OutOfRange(CsrAddr),
    /// Address is not 8-byte aligned
    Unaligned(CsrAddr),
    /// Device no longer responds
    DeviceGone,
}

impl fmt::Display for CsrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsrError::OutOfRange(addr) => write!(f, "csr 0x{:08X} out of range", addr),
            CsrError::Unaligned(addr) => write!(f, "csr 0x{:08X} unaligned", addr),
            CsrError::DeviceGone => write!(f, "device gone"),
        }
    }
}

/// 64-bit register accessor for one device.
///
/// Writes may be posted; `flush64` forces completion of every earlier
/// write before returning.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Several links share one device
/// and program disjoint registers concurrently.
pub trait CsrAccess: Send + Sync {
    /// Read a register.
    fn read64(&self, addr: CsrAddr) -> Result<u64, CsrError>;

    /// Write a register.
    fn write64(&self, addr: CsrAddr, value: u64) -> Result<(), CsrError>;

    /// Force posted writes to complete.
    ///
    /// The default is a dummy read of `addr`.
    fn flush64(&self, addr: CsrAddr) -> Result<(), CsrError> {
        self.read64(addr).map(|_| ())
    }
}

/// Read-modify-write helpers, usable on `dyn CsrAccess`.
pub trait CsrAccessExt: CsrAccess {
    /// Read `addr`, apply `f`, write the result back.
    fn modify64(&self, addr: CsrAddr, f: impl FnOnce(u64) -> u64) -> Result<(), CsrError> {
        let value = self.read64(addr)?;
        self.write64(addr, f(value))
    }
}

impl<T: CsrAccess + ?Sized> CsrAccessExt for T {}
