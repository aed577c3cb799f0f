//! A simulated call across the component boundary.
//!
//! [`CallFrame`] drives both sides of one call against a shared
//! [`LinearMemory`], following the ownership protocol:
//!
//! 1. the caller lowers the arguments, spilling them into a parameter area
//!    when they are too wide, and reserves a return area when needed;
//! 2. the callee lifts the arguments and immediately frees the blocks they
//!    owned, including the parameter area;
//! 3. the callee lowers its results, into the return area when there is one;
//! 4. the caller lifts the results;
//! 5. the caller runs post-return, which frees the blocks the results owned,
//!    and releases its return area.
//!
//! A failing step releases every allocation it made before returning.

use super::value::{Value, WasmVal};
use crate::abi::{CanonicalAbi, CanonicalAbiError, FunctionAbi, LinearMemory};
use crate::logging::{debug, trace, warn};
use crate::model::TypeId;

/// Arguments as the core function receives them.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredCall {
    pub core_args: Vec<WasmVal>,
    /// Return area reserved by the caller, when the function uses one.
    pub return_area: Option<u32>,
}

/// Outcome of a complete simulated call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub results: Vec<Value>,
    /// Owned handles the caller gave up to the callee.
    pub moved_to_callee: Vec<u32>,
    /// Owned handles the caller received.
    pub moved_to_caller: Vec<u32>,
}

pub struct CallFrame<'a, 'm> {
    abi: CanonicalAbi<'a>,
    memory: &'m mut LinearMemory,
}

impl<'a, 'm> CallFrame<'a, 'm> {
    pub fn new(abi: CanonicalAbi<'a>, memory: &'m mut LinearMemory) -> Self {
        Self { abi, memory }
    }

    pub fn memory(&self) -> &LinearMemory {
        self.memory
    }

    /// Run `step`, releasing everything it allocated if it fails.
    fn guarded<T>(
        &mut self,
        step: impl FnOnce(&CanonicalAbi<'a>, &mut LinearMemory) -> Result<T, CanonicalAbiError>,
    ) -> Result<T, CanonicalAbiError> {
        let mark = self.memory.mark();
        let result = step(&self.abi, self.memory);
        if result.is_err() {
            let _released = self.memory.release_since(mark);
            warn!(released = _released, "call step failed, released its allocations");
        }
        result
    }

    /// Caller side: lower `args` into core arguments.
    pub fn lower_params(
        &mut self,
        sig: &FunctionAbi,
        args: &[Value],
    ) -> Result<LoweredCall, CanonicalAbiError> {
        check_count("arguments", sig.param_types.len(), args.len())?;
        self.guarded(|abi, memory| {
            let mut core_args = Vec::with_capacity(sig.core_params.len());
            match sig.param_area {
                Some(area) => {
                    let ptr = memory.alloc(area.size, area.align);
                    let offsets = abi.field_offsets(&sig.param_types)?;
                    for ((value, ty), offset) in args.iter().zip(&sig.param_types).zip(offsets) {
                        abi.store(value, *ty, memory, ptr + offset as u32)?;
                    }
                    trace!(ptr, size = area.size, "spilled parameters");
                    core_args.push(WasmVal::I32(ptr as i32));
                }
                None => {
                    for (value, ty) in args.iter().zip(&sig.param_types) {
                        abi.push_lowered(value, *ty, memory, &mut core_args)?;
                    }
                }
            }
            let return_area = match sig.return_area {
                Some(area) => {
                    let ptr = memory.alloc(area.size, area.align);
                    core_args.push(WasmVal::I32(ptr as i32));
                    Some(ptr)
                }
                None => None,
            };
            Ok(LoweredCall {
                core_args,
                return_area,
            })
        })
    }

    /// Callee side: lift the arguments, then free what they owned.
    pub fn lift_params(
        &mut self,
        sig: &FunctionAbi,
        core_args: &[WasmVal],
    ) -> Result<Vec<Value>, CanonicalAbiError> {
        check_count("core arguments", sig.core_params.len(), core_args.len())?;
        let params = match sig.param_area {
            Some(area) => {
                let ptr = first(core_args)?.as_u32()?;
                let offsets = self.abi.field_offsets(&sig.param_types)?;
                let mut params = Vec::with_capacity(offsets.len());
                for (ty, offset) in sig.param_types.iter().zip(offsets) {
                    params.push(self.abi.load(*ty, self.memory, ptr + offset as u32)?);
                }
                self.abi.free_fields(&sig.param_types, self.memory, ptr)?;
                self.memory.free(ptr, area.size, area.align)?;
                params
            }
            None => {
                let mut params = Vec::with_capacity(sig.param_types.len());
                let mut pos = 0;
                for ty in &sig.param_types {
                    let count = self.abi.flat_count(*ty)?;
                    let words = core_args.get(pos..pos + count).ok_or(
                        CanonicalAbiError::FlatArityMismatch {
                            expected: pos + count,
                            got: core_args.len(),
                        },
                    )?;
                    params.push(self.abi.lift_flat(*ty, words, self.memory)?);
                    self.abi.free_flat(*ty, words, self.memory)?;
                    pos += count;
                }
                params
            }
        };
        Ok(params)
    }

    /// Callee side: lower `results`, returning the core results.
    pub fn lower_results(
        &mut self,
        sig: &FunctionAbi,
        call: &LoweredCall,
        results: &[Value],
    ) -> Result<Vec<WasmVal>, CanonicalAbiError> {
        check_count("results", sig.result_types.len(), results.len())?;
        self.guarded(|abi, memory| match call.return_area {
            Some(ptr) => {
                let offsets = abi.field_offsets(&sig.result_types)?;
                for ((value, ty), offset) in results.iter().zip(&sig.result_types).zip(offsets) {
                    abi.store(value, *ty, memory, ptr + offset as u32)?;
                }
                Ok(Vec::new())
            }
            None => {
                let mut core_results = Vec::with_capacity(sig.core_results.len());
                for (value, ty) in results.iter().zip(&sig.result_types) {
                    abi.push_lowered(value, *ty, memory, &mut core_results)?;
                }
                Ok(core_results)
            }
        })
    }

    /// Caller side: lift the results. Their memory stays live until
    /// [`post_return`](Self::post_return).
    pub fn lift_results(
        &mut self,
        sig: &FunctionAbi,
        call: &LoweredCall,
        core_results: &[WasmVal],
    ) -> Result<Vec<Value>, CanonicalAbiError> {
        match call.return_area {
            Some(ptr) => {
                let offsets = self.abi.field_offsets(&sig.result_types)?;
                let mut results = Vec::with_capacity(offsets.len());
                for (ty, offset) in sig.result_types.iter().zip(offsets) {
                    results.push(self.abi.load(*ty, self.memory, ptr + offset as u32)?);
                }
                Ok(results)
            }
            None => match sig.result_types.as_slice() {
                [] => Ok(Vec::new()),
                [ty] => Ok(vec![self.abi.lift_flat(*ty, core_results, self.memory)?]),
                _ => Err(CanonicalAbiError::FlatArityMismatch {
                    expected: sig.core_results.len(),
                    got: core_results.len(),
                }),
            },
        }
    }

    /// Caller side: free what the results owned, then the return area.
    pub fn post_return(
        &mut self,
        sig: &FunctionAbi,
        call: &LoweredCall,
        core_results: &[WasmVal],
    ) -> Result<(), CanonicalAbiError> {
        match (call.return_area, sig.return_area) {
            (Some(ptr), Some(area)) => {
                self.abi.free_fields(&sig.result_types, self.memory, ptr)?;
                self.memory.free(ptr, area.size, area.align)
            }
            _ => {
                if let [ty] = sig.result_types.as_slice() {
                    self.abi.free_flat(*ty, core_results, self.memory)?;
                }
                Ok(())
            }
        }
    }

    /// Run a whole call, with `callee` standing in for the implementation.
    ///
    /// On any failure every allocation made during the call is released.
    pub fn call(
        &mut self,
        sig: &FunctionAbi,
        args: &[Value],
        callee: impl FnOnce(Vec<Value>) -> Result<Vec<Value>, CanonicalAbiError>,
    ) -> Result<CallOutcome, CanonicalAbiError> {
        let mark = self.memory.mark();
        let outcome = self.run(sig, args, callee);
        if let Err(_err) = &outcome {
            let _released = self.memory.release_since(mark);
            debug!(err = %_err, released = _released, "simulated call failed");
        }
        outcome
    }

    fn run(
        &mut self,
        sig: &FunctionAbi,
        args: &[Value],
        callee: impl FnOnce(Vec<Value>) -> Result<Vec<Value>, CanonicalAbiError>,
    ) -> Result<CallOutcome, CanonicalAbiError> {
        let moved_to_callee = self.owned_handles(&sig.param_types, args)?;
        let call = self.lower_params(sig, args)?;
        let params = self.lift_params(sig, &call.core_args)?;
        let results = callee(params)?;
        let core_results = self.lower_results(sig, &call, &results)?;
        let lifted = self.lift_results(sig, &call, &core_results)?;
        self.post_return(sig, &call, &core_results)?;
        let moved_to_caller = self.owned_handles(&sig.result_types, &lifted)?;
        Ok(CallOutcome {
            results: lifted,
            moved_to_callee,
            moved_to_caller,
        })
    }

    fn owned_handles(&self, types: &[TypeId], values: &[Value]) -> Result<Vec<u32>, CanonicalAbiError> {
        let mut handles = Vec::new();
        for (value, ty) in values.iter().zip(types) {
            handles.extend(self.abi.owned_handles(value, *ty)?);
        }
        Ok(handles)
    }
}

fn check_count(what: &str, expected: usize, got: usize) -> Result<(), CanonicalAbiError> {
    if expected != got {
        return Err(CanonicalAbiError::TypeMismatch {
            expected: format!("{expected} {what}"),
            got: format!("{got} {what}"),
        });
    }
    Ok(())
}

fn first(values: &[WasmVal]) -> Result<WasmVal, CanonicalAbiError> {
    values
        .first()
        .copied()
        .ok_or(CanonicalAbiError::FlatArityMismatch {
            expected: 1,
            got: 0,
        })
}
