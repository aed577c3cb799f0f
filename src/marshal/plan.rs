//! Marshaling plans: the instruction sequence a binding generator emits
//! to cross the boundary for one function.
//!
//! A plan is a tree of [`Instruction`]s over named temporaries ([`Local`]).
//! Temporaries come from one [`NameGen`] threaded through the whole
//! generation, so nested blocks (list element bodies, variant arms) never
//! reuse a name and a plan can be printed or interpreted without renaming.
//!
//! Two directions are generated:
//!
//! * [`Direction::Import`]: the caller side. Arguments are lowered, the core
//!   function is called, results are lifted and then released.
//! * [`Direction::Export`]: the callee side. Arguments are lifted and their
//!   memory released, the native function is called, results are lowered.
//!   Export plans carry a separate post-return plan that frees the memory
//!   owned by the lowered results.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::abi::{
    Bitcast, CanonicalAbi, CanonicalAbiError, CoreType, FunctionAbi, Layout, check_flags,
    unsupported,
};
use crate::logging::debug;
use crate::model::{Type, TypeId};

/// A named temporary, printed as `t<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Local(pub u32);

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl Serialize for Local {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Source of fresh temporaries.
#[derive(Debug, Default)]
pub struct NameGen {
    next: u32,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Local {
        let local = Local(self.next);
        self.next += 1;
        local
    }

    /// Number of temporaries handed out so far.
    pub fn count(&self) -> u32 {
        self.next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Import,
    Export,
}

/// Value kinds that lower to exactly one core word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scalar {
    Bool,
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    F32,
    F64,
    Char,
    Enum,
    Flags,
    Own,
    Borrow,
}

impl Scalar {
    fn of(ty: &Type) -> Result<Option<Scalar>, CanonicalAbiError> {
        let scalar = match ty {
            Type::Bool => Scalar::Bool,
            Type::U8 => Scalar::U8,
            Type::U16 => Scalar::U16,
            Type::U32 => Scalar::U32,
            Type::U64 => Scalar::U64,
            Type::S8 => Scalar::S8,
            Type::S16 => Scalar::S16,
            Type::S32 => Scalar::S32,
            Type::S64 => Scalar::S64,
            Type::F32 => Scalar::F32,
            Type::F64 => Scalar::F64,
            Type::Char => Scalar::Char,
            Type::Enum(_) => Scalar::Enum,
            Type::Flags(flags) => {
                check_flags(flags.flags.len(), &flags.name.to_string())?;
                Scalar::Flags
            }
            Type::Resource(_) => Scalar::Own,
            Type::Borrow(_) => Scalar::Borrow,
            _ => return Ok(None),
        };
        Ok(Some(scalar))
    }

    pub fn core_type(self) -> CoreType {
        match self {
            Scalar::U64 | Scalar::S64 => CoreType::I64,
            Scalar::F32 => CoreType::F32,
            Scalar::F64 => CoreType::F64,
            _ => CoreType::I32,
        }
    }

    /// Width of the scalar in linear memory.
    pub fn width(self) -> MemWidth {
        match self {
            Scalar::Bool | Scalar::U8 => MemWidth::U8,
            Scalar::S8 => MemWidth::S8,
            Scalar::U16 => MemWidth::U16,
            Scalar::S16 => MemWidth::S16,
            Scalar::U64 | Scalar::S64 => MemWidth::I64,
            Scalar::F32 => MemWidth::F32,
            Scalar::F64 => MemWidth::F64,
            _ => MemWidth::I32,
        }
    }
}

/// Width and extension of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemWidth {
    U8,
    S8,
    U16,
    S16,
    I32,
    I64,
    F32,
    F64,
}

/// One arm of a variant-shaped instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Arm {
    pub case: u32,
    pub name: String,
    /// Temporary bound to the case payload when matching a value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Local>,
    pub body: Vec<Instruction>,
    /// Temporaries the arm produces, one per result of the enclosing
    /// instruction.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub yields: Vec<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Instruction {
    /// Name the `index`th core argument.
    Arg { index: usize, dst: Local },
    Const { ty: CoreType, value: i64, dst: Local },
    Lower { kind: Scalar, src: Local, dst: Local },
    Lift { kind: Scalar, src: Local, dst: Local },
    Bitcast { cast: Bitcast, src: Local, dst: Local },
    /// Split a record or tuple into its fields.
    Destructure { ty: String, src: Local, fields: Vec<Local> },
    /// Build a record or tuple from its fields.
    Construct { ty: String, fields: Vec<Local>, dst: Local },
    /// Copy a string into a fresh allocation.
    StringLower { src: Local, ptr: Local, len: Local },
    StringLift { ptr: Local, len: Local, dst: Local },
    /// Allocate the element block, then run `body` once per element with
    /// `item` bound to the element and `addr` to its slot.
    ListLower {
        element: String,
        layout: Layout,
        src: Local,
        ptr: Local,
        len: Local,
        item: Local,
        addr: Local,
        body: Vec<Instruction>,
    },
    /// Run `body` once per element with `addr` bound to its slot; `item` is
    /// the element the body produces.
    ListLift {
        element: String,
        layout: Layout,
        ptr: Local,
        len: Local,
        addr: Local,
        body: Vec<Instruction>,
        item: Local,
        dst: Local,
    },
    /// Match a value and produce its flat words; every arm yields `results`.
    VariantLower {
        ty: String,
        src: Local,
        results: Vec<Local>,
        arms: Vec<Arm>,
    },
    /// Select an arm by discriminant; the arm yields the payload if any.
    VariantLift {
        ty: String,
        discriminant: Local,
        arms: Vec<Arm>,
        dst: Local,
    },
    /// Match a value for its effects only.
    Match { ty: String, src: Local, arms: Vec<Arm> },
    /// Select an arm by discriminant for its effects only.
    Switch { discriminant: Local, arms: Vec<Arm> },
    Load {
        width: MemWidth,
        base: Local,
        offset: usize,
        dst: Local,
    },
    Store {
        width: MemWidth,
        src: Local,
        base: Local,
        offset: usize,
    },
    Alloc { size: usize, align: usize, dst: Local },
    Free { ptr: Local, size: usize, align: usize },
    FreeString { ptr: Local, len: Local },
    /// Free each element through `body`, then the element block.
    FreeList {
        element: String,
        layout: Layout,
        ptr: Local,
        len: Local,
        addr: Local,
        body: Vec<Instruction>,
    },
    CallCore {
        #[serde(skip_serializing_if = "Option::is_none")]
        module: Option<String>,
        name: String,
        args: Vec<Local>,
        results: Vec<Local>,
    },
    CallNative {
        name: String,
        args: Vec<Local>,
        results: Vec<Local>,
    },
    Return { values: Vec<Local> },
}

/// Cleanup an export runs after the caller has read its results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostReturnPlan {
    /// Core name of the cleanup function.
    pub name: String,
    pub params: Vec<Local>,
    pub body: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionPlan {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub direction: Direction,
    pub abi: FunctionAbi,
    /// Component-level arguments for imports, core arguments for exports.
    pub params: Vec<Local>,
    pub body: Vec<Instruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_return: Option<PostReturnPlan>,
}

impl FunctionPlan {
    /// Every instruction of the plan, nested blocks included, in pre-order.
    pub fn instructions(&self) -> Vec<&Instruction> {
        let mut out = Vec::new();
        walk(&self.body, &mut out);
        if let Some(post) = &self.post_return {
            walk(&post.body, &mut out);
        }
        out
    }
}

fn walk<'p>(body: &'p [Instruction], out: &mut Vec<&'p Instruction>) {
    for inst in body {
        out.push(inst);
        match inst {
            Instruction::ListLower { body, .. }
            | Instruction::ListLift { body, .. }
            | Instruction::FreeList { body, .. } => walk(body, out),
            Instruction::VariantLower { arms, .. }
            | Instruction::VariantLift { arms, .. }
            | Instruction::Match { arms, .. }
            | Instruction::Switch { arms, .. } => {
                for arm in arms {
                    walk(&arm.body, out);
                }
            }
            _ => {}
        }
    }
}

impl CanonicalAbi<'_> {
    /// Plan the boundary crossing of the function type `func`.
    pub fn plan(
        &self,
        module: Option<&str>,
        name: &str,
        func: TypeId,
        direction: Direction,
    ) -> Result<FunctionPlan, CanonicalAbiError> {
        let mut names = NameGen::new();
        self.plan_with(&mut names, module, name, func, direction)
    }

    /// Like [`plan`](Self::plan), drawing temporaries from `names`.
    pub fn plan_with(
        &self,
        names: &mut NameGen,
        module: Option<&str>,
        name: &str,
        func: TypeId,
        direction: Direction,
    ) -> Result<FunctionPlan, CanonicalAbiError> {
        let abi = self.function_abi(func)?;
        let mut generator = Generator {
            abi: *self,
            names,
            body: Vec::new(),
        };
        let (params, post_return) = match direction {
            Direction::Import => (generator.import(&abi, module, name)?, None),
            Direction::Export => generator.export(&abi, name)?,
        };
        let plan = FunctionPlan {
            name: name.to_string(),
            module: module.map(str::to_string),
            direction,
            abi,
            params,
            body: generator.body,
            post_return,
        };
        debug!(
            name,
            direction = ?direction,
            temporaries = names.count(),
            "planned function"
        );
        Ok(plan)
    }
}

type Words = std::vec::IntoIter<Local>;

struct Generator<'g, 'a> {
    abi: CanonicalAbi<'a>,
    names: &'g mut NameGen,
    body: Vec<Instruction>,
}

impl<'a> Generator<'_, 'a> {
    fn fresh(&mut self) -> Local {
        self.names.fresh()
    }

    fn fresh_n(&mut self, n: usize) -> Vec<Local> {
        (0..n).map(|_| self.names.fresh()).collect()
    }

    fn emit(&mut self, inst: Instruction) {
        self.body.push(inst);
    }

    /// Generate into a nested block.
    fn block<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CanonicalAbiError>,
    ) -> Result<(Vec<Instruction>, T), CanonicalAbiError> {
        let outer = std::mem::take(&mut self.body);
        let result = f(self);
        let inner = std::mem::replace(&mut self.body, outer);
        result.map(|value| (inner, value))
    }

    fn import(
        &mut self,
        abi: &FunctionAbi,
        module: Option<&str>,
        name: &str,
    ) -> Result<Vec<Local>, CanonicalAbiError> {
        let params = self.fresh_n(abi.param_types.len());
        let mut args = Vec::with_capacity(abi.core_params.len());
        match abi.param_area {
            Some(area) => {
                let ptr = self.alloc(area);
                let offsets = self.abi.field_offsets(&abi.param_types)?;
                for ((ty, src), offset) in abi.param_types.iter().zip(&params).zip(offsets) {
                    self.store(*ty, *src, ptr, offset)?;
                }
                args.push(ptr);
            }
            None => {
                for (ty, src) in abi.param_types.iter().zip(&params) {
                    let words = self.lower(*ty, *src)?;
                    args.extend(words);
                }
            }
        }
        let return_area = match abi.return_area {
            Some(area) => {
                let ptr = self.alloc(area);
                args.push(ptr);
                Some((ptr, area))
            }
            None => None,
        };

        let results = self.fresh_n(abi.core_results.len());
        self.emit(Instruction::CallCore {
            module: module.map(str::to_string),
            name: name.to_string(),
            args,
            results: results.clone(),
        });

        let values = match return_area {
            Some((ptr, area)) => {
                let offsets = self.abi.field_offsets(&abi.result_types)?;
                let mut values = Vec::with_capacity(offsets.len());
                for (ty, offset) in abi.result_types.iter().zip(&offsets) {
                    values.push(self.load(*ty, ptr, *offset)?);
                }
                for (ty, offset) in abi.result_types.iter().zip(offsets) {
                    self.free_stored(*ty, ptr, offset)?;
                }
                self.emit(Instruction::Free {
                    ptr,
                    size: area.size,
                    align: area.align,
                });
                values
            }
            None => match abi.result_types.as_slice() {
                [] => Vec::new(),
                [ty] => {
                    let value = self.lift(*ty, &mut results.clone().into_iter())?;
                    self.free_flat(*ty, &mut results.into_iter())?;
                    vec![value]
                }
                _ => {
                    return Err(CanonicalAbiError::FlatArityMismatch {
                        expected: abi.result_types.len(),
                        got: results.len(),
                    });
                }
            },
        };
        self.emit(Instruction::Return { values });
        Ok(params)
    }

    fn export(
        &mut self,
        abi: &FunctionAbi,
        name: &str,
    ) -> Result<(Vec<Local>, Option<PostReturnPlan>), CanonicalAbiError> {
        let params = self.fresh_n(abi.core_params.len());
        for (index, dst) in params.iter().enumerate() {
            self.emit(Instruction::Arg { index, dst: *dst });
        }
        let mut words = params.clone().into_iter();

        let mut args = Vec::with_capacity(abi.param_types.len());
        match abi.param_area {
            Some(area) => {
                let ptr = next_word(&mut words)?;
                let offsets = self.abi.field_offsets(&abi.param_types)?;
                for (ty, offset) in abi.param_types.iter().zip(&offsets) {
                    args.push(self.load(*ty, ptr, *offset)?);
                }
                for (ty, offset) in abi.param_types.iter().zip(offsets) {
                    self.free_stored(*ty, ptr, offset)?;
                }
                self.emit(Instruction::Free {
                    ptr,
                    size: area.size,
                    align: area.align,
                });
            }
            None => {
                for ty in &abi.param_types {
                    let count = self.abi.flat_count(*ty)?;
                    let own = take_words(&mut words, count)?;
                    args.push(self.lift(*ty, &mut own.clone().into_iter())?);
                    self.free_flat(*ty, &mut own.into_iter())?;
                }
            }
        }
        let return_area = if abi.ret_ptr {
            Some(next_word(&mut words)?)
        } else {
            None
        };

        let results = self.fresh_n(abi.result_types.len());
        self.emit(Instruction::CallNative {
            name: name.to_string(),
            args,
            results: results.clone(),
        });

        match return_area {
            Some(ptr) => {
                let offsets = self.abi.field_offsets(&abi.result_types)?;
                for ((ty, src), offset) in abi.result_types.iter().zip(&results).zip(offsets) {
                    self.store(*ty, *src, ptr, offset)?;
                }
                self.emit(Instruction::Return { values: Vec::new() });
            }
            None => {
                let mut values = Vec::with_capacity(abi.core_results.len());
                for (ty, src) in abi.result_types.iter().zip(&results) {
                    values.extend(self.lower(*ty, *src)?);
                }
                self.emit(Instruction::Return { values });
            }
        }

        let post_return = if abi.needs_post_return {
            Some(self.post_return(abi, name)?)
        } else {
            None
        };
        Ok((params, post_return))
    }

    fn post_return(
        &mut self,
        abi: &FunctionAbi,
        name: &str,
    ) -> Result<PostReturnPlan, CanonicalAbiError> {
        let (body, params) = self.block(|g| {
            if abi.ret_ptr {
                let ptr = g.fresh();
                g.emit(Instruction::Arg { index: 0, dst: ptr });
                let offsets = g.abi.field_offsets(&abi.result_types)?;
                for (ty, offset) in abi.result_types.iter().zip(offsets) {
                    g.free_stored(*ty, ptr, offset)?;
                }
                Ok(vec![ptr])
            } else {
                let params = g.fresh_n(abi.core_results.len());
                for (index, dst) in params.iter().enumerate() {
                    g.emit(Instruction::Arg { index, dst: *dst });
                }
                if let [ty] = abi.result_types.as_slice() {
                    g.free_flat(*ty, &mut params.clone().into_iter())?;
                }
                Ok(params)
            }
        })?;
        Ok(PostReturnPlan {
            name: format!("cabi_post_{name}"),
            params,
            body,
        })
    }

    fn alloc(&mut self, area: Layout) -> Local {
        let dst = self.fresh();
        self.emit(Instruction::Alloc {
            size: area.size,
            align: area.align,
            dst,
        });
        dst
    }

    /// Lower `src` of type `id` into its flat words.
    fn lower(&mut self, id: TypeId, src: Local) -> Result<Vec<Local>, CanonicalAbiError> {
        let ty = self.abi.resolved(id)?;
        if let Some(kind) = Scalar::of(ty)? {
            let dst = self.fresh();
            self.emit(Instruction::Lower { kind, src, dst });
            return Ok(vec![dst]);
        }
        match ty {
            Type::String => {
                let (ptr, len) = (self.fresh(), self.fresh());
                self.emit(Instruction::StringLower { src, ptr, len });
                Ok(vec![ptr, len])
            }
            Type::List(element) => {
                let layout = self.abi.layout(*element)?;
                let (ptr, len, item, addr) = (self.fresh(), self.fresh(), self.fresh(), self.fresh());
                let (body, ()) = self.block(|g| g.store(*element, item, addr, 0))?;
                self.emit(Instruction::ListLower {
                    element: self.abi.describe(*element),
                    layout,
                    src,
                    ptr,
                    len,
                    item,
                    addr,
                    body,
                });
                Ok(vec![ptr, len])
            }
            Type::Record(_) | Type::Tuple(_) => {
                let fields = fields_of(ty);
                let locals = self.destructure(id, src, fields.len());
                let mut words = Vec::new();
                for (field, local) in fields.iter().zip(locals) {
                    words.extend(self.lower(*field, local)?);
                }
                Ok(words)
            }
            _ => match cases_of(ty) {
                Some(cases) => self.lower_cases(id, &cases, src),
                None => Err(unsupported(ty)),
            },
        }
    }

    fn destructure(&mut self, id: TypeId, src: Local, count: usize) -> Vec<Local> {
        let fields = self.fresh_n(count);
        self.emit(Instruction::Destructure {
            ty: self.abi.describe(id),
            src,
            fields: fields.clone(),
        });
        fields
    }

    fn lower_cases(
        &mut self,
        id: TypeId,
        cases: &[(String, Option<TypeId>)],
        src: Local,
    ) -> Result<Vec<Local>, CanonicalAbiError> {
        let joined = self.abi.flatten_cases(cases.iter().map(|(_, ty)| *ty))?;
        let results = self.fresh_n(joined.len() + 1);
        let mut arms = Vec::with_capacity(cases.len());
        for (index, (name, ty)) in cases.iter().enumerate() {
            let payload = ty.map(|_| self.fresh());
            let (body, yields) = self.block(|g| {
                let discriminant = g.fresh();
                g.emit(Instruction::Const {
                    ty: CoreType::I32,
                    value: index as i64,
                    dst: discriminant,
                });
                let (words, kinds) = match (ty, payload) {
                    (Some(ty), Some(payload)) => (g.lower(*ty, payload)?, g.abi.flatten(*ty)?),
                    _ => (Vec::new(), Vec::new()),
                };
                let mut yields = vec![discriminant];
                for (slot, target) in joined.iter().enumerate() {
                    let word = match (words.get(slot), kinds.get(slot)) {
                        (Some(word), Some(kind)) => g.cast(*word, *kind, *target, false)?,
                        _ => {
                            let dst = g.fresh();
                            g.emit(Instruction::Const {
                                ty: *target,
                                value: 0,
                                dst,
                            });
                            dst
                        }
                    };
                    yields.push(word);
                }
                Ok(yields)
            })?;
            arms.push(Arm {
                case: index as u32,
                name: name.clone(),
                payload,
                body,
                yields,
            });
        }
        self.emit(Instruction::VariantLower {
            ty: self.abi.describe(id),
            src,
            results: results.clone(),
            arms,
        });
        Ok(results)
    }

    /// Move `word` of kind `kind` into a slot of kind `slot`, or back out of
    /// it when `inverse`.
    fn cast(
        &mut self,
        word: Local,
        kind: CoreType,
        slot: CoreType,
        inverse: bool,
    ) -> Result<Local, CanonicalAbiError> {
        let cast = Bitcast::between(kind, slot).ok_or_else(|| CanonicalAbiError::TypeMismatch {
            expected: slot.to_string(),
            got: kind.to_string(),
        })?;
        let cast = if inverse { cast.inverse() } else { cast };
        if cast == Bitcast::None {
            return Ok(word);
        }
        let dst = self.fresh();
        self.emit(Instruction::Bitcast {
            cast,
            src: word,
            dst,
        });
        Ok(dst)
    }

    /// Lift a value of type `id` from the next flat words.
    fn lift(&mut self, id: TypeId, words: &mut Words) -> Result<Local, CanonicalAbiError> {
        let ty = self.abi.resolved(id)?;
        if let Some(kind) = Scalar::of(ty)? {
            let src = next_word(words)?;
            let dst = self.fresh();
            self.emit(Instruction::Lift { kind, src, dst });
            return Ok(dst);
        }
        match ty {
            Type::String => {
                let (ptr, len) = (next_word(words)?, next_word(words)?);
                Ok(self.string_lift(ptr, len))
            }
            Type::List(element) => {
                let (ptr, len) = (next_word(words)?, next_word(words)?);
                self.list_lift(*element, ptr, len)
            }
            Type::Record(_) | Type::Tuple(_) => {
                let mut fields = Vec::new();
                for field in fields_of(ty) {
                    fields.push(self.lift(field, words)?);
                }
                Ok(self.construct(id, fields))
            }
            _ => match cases_of(ty) {
                Some(cases) => {
                    let joined = self.abi.flatten_cases(cases.iter().map(|(_, ty)| *ty))?;
                    let discriminant = next_word(words)?;
                    let slots = take_words(words, joined.len())?;
                    let mut arms = Vec::with_capacity(cases.len());
                    for (index, (name, ty)) in cases.iter().enumerate() {
                        let (body, yields) = self.block(|g| match ty {
                            Some(ty) => {
                                let payload = g.unjoin(*ty, &slots, &joined)?;
                                Ok(vec![g.lift(*ty, &mut payload.into_iter())?])
                            }
                            None => Ok(Vec::new()),
                        })?;
                        arms.push(Arm {
                            case: index as u32,
                            name: name.clone(),
                            payload: None,
                            body,
                            yields,
                        });
                    }
                    let dst = self.fresh();
                    self.emit(Instruction::VariantLift {
                        ty: self.abi.describe(id),
                        discriminant,
                        arms,
                        dst,
                    });
                    Ok(dst)
                }
                None => Err(unsupported(ty)),
            },
        }
    }

    /// Recover the words of a case payload from the joined slots.
    fn unjoin(
        &mut self,
        ty: TypeId,
        slots: &[Local],
        joined: &[CoreType],
    ) -> Result<Vec<Local>, CanonicalAbiError> {
        let kinds = self.abi.flatten(ty)?;
        let mut words = Vec::with_capacity(kinds.len());
        for ((kind, slot), target) in kinds.iter().zip(slots).zip(joined) {
            words.push(self.cast(*slot, *kind, *target, true)?);
        }
        Ok(words)
    }

    fn string_lift(&mut self, ptr: Local, len: Local) -> Local {
        let dst = self.fresh();
        self.emit(Instruction::StringLift { ptr, len, dst });
        dst
    }

    fn list_lift(&mut self, element: TypeId, ptr: Local, len: Local) -> Result<Local, CanonicalAbiError> {
        let layout = self.abi.layout(element)?;
        let addr = self.fresh();
        let (body, item) = self.block(|g| g.load(element, addr, 0))?;
        let dst = self.fresh();
        self.emit(Instruction::ListLift {
            element: self.abi.describe(element),
            layout,
            ptr,
            len,
            addr,
            body,
            item,
            dst,
        });
        Ok(dst)
    }

    fn construct(&mut self, id: TypeId, fields: Vec<Local>) -> Local {
        let dst = self.fresh();
        self.emit(Instruction::Construct {
            ty: self.abi.describe(id),
            fields,
            dst,
        });
        dst
    }

    /// Store `src` of type `id` at `base + offset`.
    fn store(
        &mut self,
        id: TypeId,
        src: Local,
        base: Local,
        offset: usize,
    ) -> Result<(), CanonicalAbiError> {
        let ty = self.abi.resolved(id)?;
        if let Some(kind) = Scalar::of(ty)? {
            let word = self.fresh();
            self.emit(Instruction::Lower {
                kind,
                src,
                dst: word,
            });
            self.emit(Instruction::Store {
                width: kind.width(),
                src: word,
                base,
                offset,
            });
            return Ok(());
        }
        match ty {
            Type::String | Type::List(_) => {
                let words = self.lower(id, src)?;
                for (i, word) in words.into_iter().enumerate() {
                    self.emit(Instruction::Store {
                        width: MemWidth::I32,
                        src: word,
                        base,
                        offset: offset + 4 * i,
                    });
                }
                Ok(())
            }
            Type::Record(_) | Type::Tuple(_) => {
                let fields = fields_of(ty);
                let offsets = self.abi.field_offsets(&fields)?;
                let locals = self.destructure(id, src, fields.len());
                for ((field, local), field_offset) in fields.iter().zip(locals).zip(offsets) {
                    self.store(*field, local, base, offset + field_offset)?;
                }
                Ok(())
            }
            _ => match cases_of(ty) {
                Some(cases) => {
                    let layout = self.abi.variant_layout(id)?;
                    let width = discriminant_width(layout.discriminant_size);
                    let mut arms = Vec::with_capacity(cases.len());
                    for (index, (name, ty)) in cases.iter().enumerate() {
                        let payload = ty.map(|_| self.fresh());
                        let (body, ()) = self.block(|g| {
                            let discriminant = g.fresh();
                            g.emit(Instruction::Const {
                                ty: CoreType::I32,
                                value: index as i64,
                                dst: discriminant,
                            });
                            g.emit(Instruction::Store {
                                width,
                                src: discriminant,
                                base,
                                offset,
                            });
                            if let (Some(ty), Some(payload)) = (ty, payload) {
                                g.store(*ty, payload, base, offset + layout.payload_offset)?;
                            }
                            Ok(())
                        })?;
                        arms.push(Arm {
                            case: index as u32,
                            name: name.clone(),
                            payload,
                            body,
                            yields: Vec::new(),
                        });
                    }
                    self.emit(Instruction::Match {
                        ty: self.abi.describe(id),
                        src,
                        arms,
                    });
                    Ok(())
                }
                None => Err(unsupported(ty)),
            },
        }
    }

    /// Load a value of type `id` from `base + offset`.
    fn load(&mut self, id: TypeId, base: Local, offset: usize) -> Result<Local, CanonicalAbiError> {
        let ty = self.abi.resolved(id)?;
        if let Some(kind) = Scalar::of(ty)? {
            let word = self.load_word(kind.width(), base, offset);
            let dst = self.fresh();
            self.emit(Instruction::Lift {
                kind,
                src: word,
                dst,
            });
            return Ok(dst);
        }
        match ty {
            Type::String => {
                let (ptr, len) = self.load_pair(base, offset);
                Ok(self.string_lift(ptr, len))
            }
            Type::List(element) => {
                let (ptr, len) = self.load_pair(base, offset);
                self.list_lift(*element, ptr, len)
            }
            Type::Record(_) | Type::Tuple(_) => {
                let fields = fields_of(ty);
                let offsets = self.abi.field_offsets(&fields)?;
                let mut locals = Vec::with_capacity(fields.len());
                for (field, field_offset) in fields.iter().zip(offsets) {
                    locals.push(self.load(*field, base, offset + field_offset)?);
                }
                Ok(self.construct(id, locals))
            }
            _ => match cases_of(ty) {
                Some(cases) => {
                    let layout = self.abi.variant_layout(id)?;
                    let discriminant =
                        self.load_word(discriminant_width(layout.discriminant_size), base, offset);
                    let mut arms = Vec::with_capacity(cases.len());
                    for (index, (name, ty)) in cases.iter().enumerate() {
                        let (body, yields) = self.block(|g| match ty {
                            Some(ty) => Ok(vec![g.load(*ty, base, offset + layout.payload_offset)?]),
                            None => Ok(Vec::new()),
                        })?;
                        arms.push(Arm {
                            case: index as u32,
                            name: name.clone(),
                            payload: None,
                            body,
                            yields,
                        });
                    }
                    let dst = self.fresh();
                    self.emit(Instruction::VariantLift {
                        ty: self.abi.describe(id),
                        discriminant,
                        arms,
                        dst,
                    });
                    Ok(dst)
                }
                None => Err(unsupported(ty)),
            },
        }
    }

    fn load_word(&mut self, width: MemWidth, base: Local, offset: usize) -> Local {
        let dst = self.fresh();
        self.emit(Instruction::Load {
            width,
            base,
            offset,
            dst,
        });
        dst
    }

    fn load_pair(&mut self, base: Local, offset: usize) -> (Local, Local) {
        let ptr = self.load_word(MemWidth::I32, base, offset);
        let len = self.load_word(MemWidth::I32, base, offset + 4);
        (ptr, len)
    }

    /// Free the memory owned by the flat value of type `id` in `words`.
    fn free_flat(&mut self, id: TypeId, words: &mut Words) -> Result<(), CanonicalAbiError> {
        if !self.abi.needs_deallocate(id)? {
            let count = self.abi.flat_count(id)?;
            take_words(words, count)?;
            return Ok(());
        }
        let ty = self.abi.resolved(id)?;
        match ty {
            Type::String => {
                let (ptr, len) = (next_word(words)?, next_word(words)?);
                self.emit(Instruction::FreeString { ptr, len });
                Ok(())
            }
            Type::List(element) => {
                let (ptr, len) = (next_word(words)?, next_word(words)?);
                self.free_list(*element, ptr, len)
            }
            Type::Record(_) | Type::Tuple(_) => {
                for field in fields_of(ty) {
                    self.free_flat(field, words)?;
                }
                Ok(())
            }
            _ => match cases_of(ty) {
                Some(cases) => {
                    let joined = self.abi.flatten_cases(cases.iter().map(|(_, ty)| *ty))?;
                    let discriminant = next_word(words)?;
                    let slots = take_words(words, joined.len())?;
                    let mut arms = Vec::new();
                    for (index, (name, ty)) in cases.iter().enumerate() {
                        let Some(ty) = ty else { continue };
                        if !self.abi.needs_deallocate(*ty)? {
                            continue;
                        }
                        let (body, ()) = self.block(|g| {
                            let payload = g.unjoin(*ty, &slots, &joined)?;
                            g.free_flat(*ty, &mut payload.into_iter())
                        })?;
                        arms.push(owned_arm(index, name, body));
                    }
                    self.emit(Instruction::Switch { discriminant, arms });
                    Ok(())
                }
                None => Err(unsupported(ty)),
            },
        }
    }

    /// Free the memory owned by the value of type `id` at `base + offset`.
    fn free_stored(&mut self, id: TypeId, base: Local, offset: usize) -> Result<(), CanonicalAbiError> {
        if !self.abi.needs_deallocate(id)? {
            return Ok(());
        }
        let ty = self.abi.resolved(id)?;
        match ty {
            Type::String => {
                let (ptr, len) = self.load_pair(base, offset);
                self.emit(Instruction::FreeString { ptr, len });
                Ok(())
            }
            Type::List(element) => {
                let (ptr, len) = self.load_pair(base, offset);
                self.free_list(*element, ptr, len)
            }
            Type::Record(_) | Type::Tuple(_) => {
                let fields = fields_of(ty);
                let offsets = self.abi.field_offsets(&fields)?;
                for (field, field_offset) in fields.iter().zip(offsets) {
                    self.free_stored(*field, base, offset + field_offset)?;
                }
                Ok(())
            }
            _ => match cases_of(ty) {
                Some(cases) => {
                    let layout = self.abi.variant_layout(id)?;
                    let discriminant =
                        self.load_word(discriminant_width(layout.discriminant_size), base, offset);
                    let mut arms = Vec::new();
                    for (index, (name, ty)) in cases.iter().enumerate() {
                        let Some(ty) = ty else { continue };
                        if !self.abi.needs_deallocate(*ty)? {
                            continue;
                        }
                        let (body, ()) = self
                            .block(|g| g.free_stored(*ty, base, offset + layout.payload_offset))?;
                        arms.push(owned_arm(index, name, body));
                    }
                    self.emit(Instruction::Switch { discriminant, arms });
                    Ok(())
                }
                None => Err(unsupported(ty)),
            },
        }
    }

    fn free_list(&mut self, element: TypeId, ptr: Local, len: Local) -> Result<(), CanonicalAbiError> {
        let layout = self.abi.layout(element)?;
        let addr = self.fresh();
        let (body, ()) = self.block(|g| g.free_stored(element, addr, 0))?;
        self.emit(Instruction::FreeList {
            element: self.abi.describe(element),
            layout,
            ptr,
            len,
            addr,
            body,
        });
        Ok(())
    }
}

fn owned_arm(index: usize, name: &str, body: Vec<Instruction>) -> Arm {
    Arm {
        case: index as u32,
        name: name.to_string(),
        payload: None,
        body,
        yields: Vec::new(),
    }
}

fn fields_of(ty: &Type) -> Vec<TypeId> {
    match ty {
        Type::Record(record) => record.fields.iter().map(|f| f.ty).collect(),
        Type::Tuple(elements) => elements.clone(),
        _ => Vec::new(),
    }
}

/// Cases of the discriminated shapes, in discriminant order.
fn cases_of(ty: &Type) -> Option<Vec<(String, Option<TypeId>)>> {
    let cases = match ty {
        Type::Option(inner) => vec![("none".to_string(), None), ("some".to_string(), Some(*inner))],
        Type::Result(result) => vec![
            ("ok".to_string(), result.ok),
            ("error".to_string(), result.err),
        ],
        Type::Variant(variant) => variant
            .cases
            .iter()
            .map(|case| (case.name.clone(), case.ty))
            .collect(),
        _ => return None,
    };
    Some(cases)
}

fn discriminant_width(size: usize) -> MemWidth {
    if size == 1 { MemWidth::U8 } else { MemWidth::I32 }
}

fn next_word(words: &mut Words) -> Result<Local, CanonicalAbiError> {
    words.next().ok_or(CanonicalAbiError::FlatArityMismatch {
        expected: 1,
        got: 0,
    })
}

fn take_words(words: &mut Words, count: usize) -> Result<Vec<Local>, CanonicalAbiError> {
    let taken: Vec<Local> = words.by_ref().take(count).collect();
    if taken.len() != count {
        return Err(CanonicalAbiError::FlatArityMismatch {
            expected: count,
            got: taken.len(),
        });
    }
    Ok(taken)
}
