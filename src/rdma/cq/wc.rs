//! Work completion type and the completion translator (component D).

use crate::error::{FabricError, WcStatus};
use crate::rdma::fabric::{RawCqEntry, RawCqErrEntry};

/// Verbs-style work completion opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WcOpcode {
    Send,
    Recv,
    RdmaRead,
    RdmaWrite,
}

/// Raw completion flag bits, mirroring the reference implementation's
/// `kfi_flags_to_ib_opcode`: send/recv/read/write, default to send.
const FLAG_SEND: u64 = 1 << 0;
const FLAG_RECV: u64 = 1 << 1;
const FLAG_READ: u64 = 1 << 2;
const FLAG_WRITE: u64 = 1 << 3;

impl WcOpcode {
    fn from_flags(flags: u64) -> Self {
        if flags & FLAG_RECV != 0 {
            WcOpcode::Recv
        } else if flags & FLAG_READ != 0 {
            WcOpcode::RdmaRead
        } else if flags & FLAG_WRITE != 0 {
            WcOpcode::RdmaWrite
        } else {
            // Default to send if no flag bit matched, per the reference
            // implementation's fallback.
            WcOpcode::Send
        }
    }
}

/// A verbs-style work completion.
#[derive(Debug, Clone, Copy)]
pub struct Wc {
    pub wr_id: u64,
    pub status: WcStatus,
    pub opcode: WcOpcode,
    pub byte_len: usize,
    pub vendor_err: i32,
}

impl Wc {
    pub fn ok(&self) -> Result<usize, WcStatus> {
        if self.status == WcStatus::Success {
            Ok(self.byte_len)
        } else {
            Err(self.status)
        }
    }
}

/// Render a successful raw completion entry as a work completion. Never
/// fails: a success entry always has status Success.
pub(crate) fn translate_success(entry: RawCqEntry) -> Wc {
    Wc {
        wr_id: entry.op_context as u64,
        status: WcStatus::Success,
        opcode: WcOpcode::from_flags(entry.flags),
        byte_len: entry.len,
        vendor_err: 0,
    }
}

/// Render an error raw completion entry as a work completion.
pub(crate) fn translate_error(entry: RawCqErrEntry) -> Wc {
    let fabric_err = FabricError::from_raw(entry.err);
    Wc {
        wr_id: entry.op_context as u64,
        status: WcStatus::from(fabric_err),
        opcode: WcOpcode::from_flags(entry.flags),
        byte_len: entry.len,
        vendor_err: entry.err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(flags: u64) -> RawCqEntry {
        RawCqEntry {
            op_context: 0x1234 as *mut std::ffi::c_void,
            flags,
            len: 64,
        }
    }

    #[test]
    fn opcode_translation_table() {
        assert_eq!(WcOpcode::from_flags(FLAG_SEND), WcOpcode::Send);
        assert_eq!(WcOpcode::from_flags(FLAG_RECV), WcOpcode::Recv);
        assert_eq!(WcOpcode::from_flags(FLAG_READ), WcOpcode::RdmaRead);
        assert_eq!(WcOpcode::from_flags(FLAG_WRITE), WcOpcode::RdmaWrite);
        assert_eq!(WcOpcode::from_flags(0), WcOpcode::Send);
    }

    #[test]
    fn status_translation_table() {
        assert_eq!(WcStatus::from(FabricError::Truncated), WcStatus::LocalLengthError);
        assert_eq!(WcStatus::from(FabricError::Access), WcStatus::LocalProtectionError);
        assert_eq!(WcStatus::from(FabricError::Canceled), WcStatus::WrFlushError);
        assert_eq!(WcStatus::from(FabricError::Other), WcStatus::GeneralError);
        assert_eq!(WcStatus::from(FabricError::NoMem), WcStatus::GeneralError);
    }

    #[test]
    fn success_entry_translates_to_success_status() {
        let wc = translate_success(entry(FLAG_SEND));
        assert_eq!(wc.wr_id, 0x1234);
        assert_eq!(wc.status, WcStatus::Success);
        assert_eq!(wc.ok(), Ok(64));
    }

    #[test]
    fn error_entry_carries_vendor_code() {
        let entry = RawCqErrEntry {
            op_context: 0xabcd as *mut std::ffi::c_void,
            flags: FLAG_WRITE,
            len: 0,
            err: crate::error::KFI_ERRNO_OFFSET + 15, // EACCES
        };
        let wc = translate_error(entry);
        assert_eq!(wc.status, WcStatus::LocalProtectionError);
        assert_eq!(wc.opcode, WcOpcode::RdmaWrite);
        assert_eq!(wc.ok(), Err(WcStatus::LocalProtectionError));
    }
}
