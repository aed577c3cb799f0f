//! Moving values across the component boundary.
//!
//! - [`Value`] and [`WasmVal`]: native values and the core words they
//!   flatten to.
//! - Lowering, lifting and cleanup are methods on
//!   [`CanonicalAbi`](crate::abi::CanonicalAbi) that run against a
//!   [`LinearMemory`](crate::abi::LinearMemory).
//! - [`CallFrame`] runs a whole call under the ownership protocol.
//! - [`HandleTable`] tracks resource representations behind handles.
//! - [`plan`] produces the instruction sequences a binding generator emits.

mod call;
mod cleanup;
mod handles;
mod lift;
mod lower;
pub mod plan;
mod value;

pub use call::{CallFrame, CallOutcome, LoweredCall};
pub use handles::HandleTable;
pub use plan::{Direction, FunctionPlan, Instruction, NameGen};
pub use value::{Value, WasmVal};
