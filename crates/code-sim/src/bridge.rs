//! Interception of simulated calls into the native runtime.
//!
//! Compiled code reaches runtime entry points through thunks that load the
//! entry address into a scratch register and branch to it:
//!
//! ```text
//!   simulated arm64 code              |  bridge  |  host runtime
//!   BL  TestSuspend@thunk  -> LDR x16, [..]
//!                             BR  x16 ---------> call test_suspend()
//!       ^                                              |
//!       +------------------ resume at lr <-------------+
//! ```
//!
//! `BR` targets resume at the link register (the thunk was reached by `BL`);
//! `BLR` targets resume at the instruction after the branch. Targets that are
//! not entry points are simulated as ordinary code.

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;

use crate::abi::{RETURN_REG, SECOND_ARG_REG};
use crate::engine::{BranchAction, BranchInterceptor, BranchKind, RegisterFile};

/// `void artTestSuspend()`
pub type SuspendCheckFn = extern "C" fn();

/// `Object* artAllocObject(Class* klass)`
pub type AllocObjectFn = extern "C" fn(usize) -> usize;

/// `Array* artAllocArray(Class* klass, int32_t component_count)`
pub type AllocArrayFn = extern "C" fn(usize, i32) -> usize;

/// Native runtime functions reachable from simulated code.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub test_suspend: SuspendCheckFn,
    pub alloc_object_initialized: AllocObjectFn,
    pub alloc_array_resolved8: AllocArrayFn,
    pub alloc_array_resolved16: AllocArrayFn,
    pub alloc_array_resolved32: AllocArrayFn,
    pub alloc_array_resolved64: AllocArrayFn,
}

/// A native function pointer tagged with its C signature.
#[derive(Debug, Clone, Copy)]
pub enum NativeCall {
    Void(SuspendCheckFn),
    Ptr(AllocObjectFn),
    PtrI32(AllocArrayFn),
}

impl NativeCall {
    /// Host address of the function, as compiled code sees it.
    #[must_use]
    pub fn address(&self) -> u64 {
        let address = match *self {
            Self::Void(f) => f as usize,
            Self::Ptr(f) => f as usize,
            Self::PtrI32(f) => f as usize,
        };
        address as u64
    }

    #[must_use]
    pub const fn arity(&self) -> usize {
        match self {
            Self::Void(_) => 0,
            Self::Ptr(_) => 1,
            Self::PtrI32(_) => 2,
        }
    }

    /// Call the function with arguments from x0/w1 and write a non-void result to x0.
    pub fn invoke(&self, regs: &mut RegisterFile) {
        match *self {
            Self::Void(f) => f(),
            Self::Ptr(f) => {
                let object = f(regs.read_x(RETURN_REG) as usize);
                regs.write_x(RETURN_REG, object as u64);
            }
            Self::PtrI32(f) => {
                let klass = regs.read_x(RETURN_REG) as usize;
                let count = regs.read_w(SECOND_ARG_REG) as i32;
                regs.write_x(RETURN_REG, f(klass, count) as u64);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RuntimeCall {
    name: &'static str,
    native: NativeCall,
}

type EntryTable = HashMap<(BranchKind, u64), RuntimeCall>;

impl EntryPoints {
    fn entries(&self) -> [(BranchKind, &'static str, NativeCall); 6] {
        [
            (BranchKind::Br, "test_suspend", NativeCall::Void(self.test_suspend)),
            (
                BranchKind::Blr,
                "alloc_object_initialized",
                NativeCall::Ptr(self.alloc_object_initialized),
            ),
            (
                BranchKind::Blr,
                "alloc_array_resolved8",
                NativeCall::PtrI32(self.alloc_array_resolved8),
            ),
            (
                BranchKind::Blr,
                "alloc_array_resolved16",
                NativeCall::PtrI32(self.alloc_array_resolved16),
            ),
            (
                BranchKind::Blr,
                "alloc_array_resolved32",
                NativeCall::PtrI32(self.alloc_array_resolved32),
            ),
            (
                BranchKind::Blr,
                "alloc_array_resolved64",
                NativeCall::PtrI32(self.alloc_array_resolved64),
            ),
        ]
    }

    fn table(&self) -> EntryTable {
        let mut table = HashMap::new();
        for (kind, name, native) in self.entries() {
            // Earlier entries win when two slots share an address.
            table
                .entry((kind, native.address()))
                .or_insert(RuntimeCall { name, native });
        }
        table
    }
}

/// Branch interceptor that services runtime entry points natively.
#[derive(Debug, Default)]
pub struct CallBridge {
    table: OnceLock<EntryTable>,
}

impl CallBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the entry points. Must happen exactly once, before the first run.
    pub fn install(&self, entry_points: &EntryPoints) {
        let installed = self.table.set(entry_points.table()).is_ok();
        debug_assert!(installed, "entry points installed twice");
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.table.get().is_some()
    }

    /// The native call a branch of `kind` to `target` would be serviced by,
    /// without calling it. `None` before installation or for an ordinary
    /// branch target. Lets hosts check a thunk's address and signature.
    #[must_use]
    pub fn lookup(&self, kind: BranchKind, target: u64) -> Option<NativeCall> {
        self.table
            .get()?
            .get(&(kind, target))
            .map(|call| call.native)
    }
}

impl BranchInterceptor for CallBridge {
    fn intercept(
        &self,
        kind: BranchKind,
        target: u64,
        next_pc: u64,
        regs: &mut RegisterFile,
    ) -> BranchAction {
        debug_assert!(
            self.is_installed(),
            "entry points must be installed before simulation"
        );
        let Some(call) = self.table.get().and_then(|table| table.get(&(kind, target))) else {
            return BranchAction::Simulate;
        };
        let resume = match kind {
            BranchKind::Br => regs.lr(),
            BranchKind::Blr => next_pc,
        };
        debug!(
            entry = call.name,
            target = format_args!("{target:#x}"),
            resume = format_args!("{resume:#x}"),
            "runtime call"
        );
        call.native.invoke(regs);
        BranchAction::Resume(resume)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    thread_local! {
        static SUSPENDS: Cell<u32> = const { Cell::new(0) };
        static LAST_ARRAY: Cell<(usize, i32)> = const { Cell::new((0, 0)) };
    }

    extern "C" fn test_suspend() {
        SUSPENDS.with(|c| c.set(c.get() + 1));
    }

    extern "C" fn alloc_object(klass: usize) -> usize {
        klass + 0x100
    }

    extern "C" fn alloc_array8(klass: usize, count: i32) -> usize {
        LAST_ARRAY.with(|c| c.set((klass, count)));
        0x8000 + count as usize
    }

    extern "C" fn alloc_array16(klass: usize, count: i32) -> usize {
        klass ^ 0x16 ^ count as usize
    }

    extern "C" fn alloc_array32(klass: usize, count: i32) -> usize {
        klass ^ 0x32 ^ count as usize
    }

    extern "C" fn alloc_array64(klass: usize, count: i32) -> usize {
        klass ^ 0x64 ^ count as usize
    }

    fn entry_points() -> EntryPoints {
        EntryPoints {
            test_suspend,
            alloc_object_initialized: alloc_object,
            alloc_array_resolved8: alloc_array8,
            alloc_array_resolved16: alloc_array16,
            alloc_array_resolved32: alloc_array32,
            alloc_array_resolved64: alloc_array64,
        }
    }

    fn installed_bridge() -> CallBridge {
        let bridge = CallBridge::new();
        bridge.install(&entry_points());
        bridge
    }

    #[test]
    fn test_br_to_suspend_check_resumes_at_lr() {
        let bridge = installed_bridge();
        let mut regs = RegisterFile::new();
        regs.write_x(30, 0x4004);
        let target = NativeCall::Void(test_suspend).address();

        let before = SUSPENDS.with(Cell::get);
        let action = bridge.intercept(BranchKind::Br, target, 0x5008, &mut regs);
        assert_eq!(action, BranchAction::Resume(0x4004));
        assert_eq!(SUSPENDS.with(Cell::get), before + 1);
    }

    #[test]
    fn test_blr_to_array_allocation_passes_two_arguments() {
        let bridge = installed_bridge();
        let mut regs = RegisterFile::new();
        regs.write_x(0, 0xABC0);
        regs.write_x(1, 0xFFFF_FFFF_0000_0010);
        let target = NativeCall::PtrI32(alloc_array8).address();

        let action = bridge.intercept(BranchKind::Blr, target, 0x2004, &mut regs);
        assert_eq!(action, BranchAction::Resume(0x2004));
        assert_eq!(LAST_ARRAY.with(Cell::get), (0xABC0, 16));
        assert_eq!(regs.read_x(0), 0x8010);
    }

    #[test]
    fn test_blr_to_object_allocation_writes_x0() {
        let bridge = installed_bridge();
        let mut regs = RegisterFile::new();
        regs.write_x(0, 0x7000);
        let target = NativeCall::Ptr(alloc_object).address();
        let action = bridge.intercept(BranchKind::Blr, target, 0x10, &mut regs);
        assert_eq!(action, BranchAction::Resume(0x10));
        assert_eq!(regs.read_x(0), 0x7100);
    }

    #[test]
    fn test_branch_form_must_match_entry() {
        let bridge = installed_bridge();
        let mut regs = RegisterFile::new();
        let suspend = NativeCall::Void(test_suspend).address();
        let alloc = NativeCall::Ptr(alloc_object).address();
        assert_eq!(
            bridge.intercept(BranchKind::Blr, suspend, 0, &mut regs),
            BranchAction::Simulate
        );
        assert_eq!(
            bridge.intercept(BranchKind::Br, alloc, 0, &mut regs),
            BranchAction::Simulate
        );
    }

    #[test]
    fn test_unknown_target_is_simulated() {
        let bridge = installed_bridge();
        let mut regs = RegisterFile::new();
        regs.write_x(0, 5);
        assert_eq!(
            bridge.intercept(BranchKind::Blr, 0x1234_5678, 0x40, &mut regs),
            BranchAction::Simulate
        );
        assert_eq!(regs.read_x(0), 5);
    }

    #[test]
    fn test_lookup_reports_signature() {
        let bridge = installed_bridge();
        let call = bridge
            .lookup(BranchKind::Blr, NativeCall::PtrI32(alloc_array64).address())
            .unwrap();
        assert_eq!(call.arity(), 2);
        assert!(CallBridge::new().lookup(BranchKind::Br, 0).is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "installed twice")]
    fn test_second_install_panics_in_debug() {
        let bridge = installed_bridge();
        bridge.install(&entry_points());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "must be installed")]
    fn test_intercept_before_install_panics_in_debug() {
        let mut regs = RegisterFile::new();
        CallBridge::new().intercept(BranchKind::Blr, 0x10, 0x14, &mut regs);
    }
}
