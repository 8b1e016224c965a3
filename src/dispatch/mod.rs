use crate::exec::{ErrorKind, ExecResult, Glulx};
use crate::interface::HostObject;
use crate::memory::{Memory, MemoryAccess};
use log::debug;
use std::slice;
use std::vec;

mod proto;
mod registry;

pub use proto::{parse_prototype, Arg, ArgType, CharKind, Flags, Prototype};
pub use registry::{ArrayTable, ObjectTables, Registry};

/// Class index of streams in the object tables; @save and @restore name streams by ID.
pub const STREAM_CLASS: u32 = 1;

// reference address meaning "the VM stack"
const STACK_REF: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayRef {
    // mapped in place in VM memory
    Bytes { addr: u32, len: u32 },
    // copied into the array table
    Ints { id: u32 },
}

/// One host-level argument slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlkArg {
    PtrFlag(bool),
    Uint(u32),
    Sint(i32),
    Uch(u8),
    Sch(i8),
    Ch(u8),
    Opaque(Option<HostObject>),
    CharStr(Vec<u8>),
    UniCharStr(Vec<u32>),
    Array(ArrayRef),
}

impl GlkArg {
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            GlkArg::Uint(v) => Some(v),
            GlkArg::Sint(v) => Some(v as u32),
            GlkArg::Uch(v) | GlkArg::Ch(v) => Some(u32::from(v)),
            GlkArg::Sch(v) => Some(v as i32 as u32),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<HostObject> {
        match *self {
            GlkArg::Opaque(obj) => obj,
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<ArrayRef> {
        match *self {
            GlkArg::Array(array) => Some(array),
            _ => None,
        }
    }

    // zero value of a slot of this type
    fn empty(ty: &ArgType) -> GlkArg {
        match *ty {
            ArgType::Int { signed: true } => GlkArg::Sint(0),
            ArgType::Char(CharKind::Unsigned) => GlkArg::Uch(0),
            ArgType::Char(CharKind::Signed) => GlkArg::Sch(0),
            ArgType::Char(CharKind::Native) => GlkArg::Ch(0),
            ArgType::CString => GlkArg::CharStr(Vec::new()),
            ArgType::UniString => GlkArg::UniCharStr(Vec::new()),
            ArgType::Object(_) => GlkArg::Opaque(None),
            ArgType::Int { signed: false } | ArgType::Struct(_) => GlkArg::Uint(0),
        }
    }
}

/// What the host may touch while it services a glk call.
pub struct DispatchContext<'b> {
    memory: &'b mut Memory,
    registry: &'b mut Registry,
}

impl<'b> DispatchContext<'b> {
    pub(crate) fn new(memory: &'b mut Memory, registry: &'b mut Registry) -> Self {
        DispatchContext { memory, registry }
    }

    pub fn memory(&self) -> &Memory {
        &*self.memory
    }

    pub fn register_object(&mut self, class: u32, obj: HostObject) -> ExecResult<u32> {
        let id = self
            .registry
            .objects
            .register(class, obj)
            .ok_or(ErrorKind::BadObjectRef { class, id: 0 })?;
        debug!("registered object {} in class {}", id, class);
        Ok(id)
    }

    pub fn unregister_object(&mut self, class: u32, obj: HostObject) -> Option<u32> {
        self.registry.objects.unregister(class, obj)
    }

    pub fn object_id(&self, class: u32, obj: HostObject) -> Option<u32> {
        self.registry.objects.id_of(class, obj)
    }

    pub fn lookup_object(&self, class: u32, id: u32) -> Option<HostObject> {
        self.registry.objects.lookup(class, id)
    }

    /// Keeps an array alive after the current call returns.
    pub fn retain_array(&mut self, array: ArrayRef) -> ExecResult<()> {
        match array {
            ArrayRef::Bytes { .. } => Ok(()),
            ArrayRef::Ints { id } if self.registry.arrays.retain(id) => Ok(()),
            ArrayRef::Ints { .. } => Err(ErrorKind::BadArrayRef),
        }
    }

    /// Releases a retained array, writing its final contents back to VM memory.
    pub fn unregister_array(&mut self, array: ArrayRef) -> ExecResult<()> {
        match array {
            ArrayRef::Bytes { .. } => Ok(()),
            ArrayRef::Ints { id } => {
                let (addr, data) = self.registry.arrays.take(id).ok_or(ErrorKind::BadArrayRef)?;
                write_words(self.memory, addr, &data)
            }
        }
    }

    pub fn bytes(&self, array: ArrayRef) -> ExecResult<&[u8]> {
        match array {
            ArrayRef::Bytes { addr, len } => Ok(self.memory.slice(addr, len)?),
            ArrayRef::Ints { .. } => Err(ErrorKind::BadArrayRef),
        }
    }

    pub fn bytes_mut(&mut self, array: ArrayRef) -> ExecResult<&mut [u8]> {
        match array {
            ArrayRef::Bytes { addr, len } => Ok(self.memory.slice_mut(addr, len)?),
            ArrayRef::Ints { .. } => Err(ErrorKind::BadArrayRef),
        }
    }

    pub fn ints(&self, array: ArrayRef) -> ExecResult<&[u32]> {
        match array {
            ArrayRef::Ints { id } => self.registry.arrays.get(id).ok_or(ErrorKind::BadArrayRef),
            ArrayRef::Bytes { .. } => Err(ErrorKind::BadArrayRef),
        }
    }

    pub fn ints_mut(&mut self, array: ArrayRef) -> ExecResult<&mut [u32]> {
        match array {
            ArrayRef::Ints { id } => self
                .registry
                .arrays
                .get_mut(id)
                .ok_or(ErrorKind::BadArrayRef),
            ArrayRef::Bytes { .. } => Err(ErrorKind::BadArrayRef),
        }
    }
}

fn write_words(memory: &mut Memory, addr: u32, words: &[u32]) -> ExecResult<()> {
    for (ix, &word) in words.iter().enumerate() {
        memory.write_u32(addr.wrapping_add(4 * ix as u32), word)?;
    }
    Ok(())
}

// the value types a reference argument reads and writes, one per word
fn fields(ty: &ArgType) -> Vec<&ArgType> {
    match ty {
        ArgType::Struct(fields) => fields.iter().map(|f| &f.ty).collect(),
        ty => vec![ty],
    }
}

impl<'a> Glulx<'a> {
    /// Calls glk selector `selector` with the VM's arguments and returns its result.
    pub(crate) fn perform_glk(&mut self, selector: u32, args: &[u32]) -> ExecResult<u32> {
        let text = self
            .host
            .prototype(selector)
            .ok_or(ErrorKind::UnknownGlkSelector(selector))?;
        let proto =
            parse_prototype(text).ok_or_else(|| ErrorKind::BadPrototype(text.to_string()))?;
        let expected = proto.vm_arg_count();
        if expected != args.len() as u32 {
            return Err(ErrorKind::WrongGlkArgCount {
                selector,
                expected,
                got: args.len() as u32,
            });
        }
        debug!("glk {:#x} {}{:x?}", selector, text, args);

        let mut slots = Vec::new();
        let mut vm_args = args.iter();
        for arg in &proto.args {
            self.marshal_in(selector, arg, &mut vm_args, &mut slots)?;
        }
        if let Some(ret) = &proto.ret {
            slots.push(GlkArg::PtrFlag(true));
            slots.push(GlkArg::empty(&ret.ty));
        }

        let mut ctx = DispatchContext::new(&mut self.memory, &mut self.registry);
        self.host.call(selector, &mut slots, &mut ctx)?;

        let mut vm_args = args.iter();
        let mut slots = slots.into_iter();
        for arg in &proto.args {
            self.marshal_out(selector, arg, &mut vm_args, &mut slots)?;
        }
        match &proto.ret {
            Some(ret) => {
                slots.next();
                let slot = slots.next().ok_or(ErrorKind::BadGlkResult(selector))?;
                self.value_out(selector, &ret.ty, &slot)
            }
            None => Ok(0),
        }
    }

    fn marshal_in(
        &mut self,
        selector: u32,
        arg: &Arg,
        vm_args: &mut slice::Iter<u32>,
        slots: &mut Vec<GlkArg>,
    ) -> ExecResult<()> {
        let flags = arg.flags;
        let addr = vm_args.next().copied().unwrap_or(0);
        if flags.array {
            let len = vm_args.next().copied().unwrap_or(0);
            if addr == 0 {
                if flags.non_null {
                    return Err(ErrorKind::NullGlkArgument(selector));
                }
                slots.push(GlkArg::PtrFlag(false));
                return Ok(());
            }
            let array = self.capture_array(&arg.ty, addr, len, flags)?;
            slots.push(GlkArg::PtrFlag(true));
            slots.push(GlkArg::Array(array));
            slots.push(GlkArg::Uint(len));
            return Ok(());
        }
        if !flags.is_ref {
            slots.push(self.value_in(selector, &arg.ty, addr, flags.non_null)?);
            return Ok(());
        }
        if addr == 0 {
            if flags.non_null {
                return Err(ErrorKind::NullGlkArgument(selector));
            }
            slots.push(GlkArg::PtrFlag(false));
            return Ok(());
        }
        slots.push(GlkArg::PtrFlag(true));
        for (ix, ty) in fields(&arg.ty).into_iter().enumerate() {
            let slot = if flags.pass_in {
                let raw = self.read_ref(addr, ix as u32)?;
                self.value_in(selector, ty, raw, false)?
            } else {
                GlkArg::empty(ty)
            };
            slots.push(slot);
        }
        Ok(())
    }

    fn marshal_out(
        &mut self,
        selector: u32,
        arg: &Arg,
        vm_args: &mut slice::Iter<u32>,
        slots: &mut vec::IntoIter<GlkArg>,
    ) -> ExecResult<()> {
        let flags = arg.flags;
        let addr = vm_args.next().copied().unwrap_or(0);
        if flags.array {
            vm_args.next();
            if slots.next() != Some(GlkArg::PtrFlag(true)) {
                return Ok(());
            }
            let array = slots
                .next()
                .and_then(|slot| slot.as_array())
                .ok_or(ErrorKind::BadGlkResult(selector))?;
            slots.next();
            return self.release_array(array, flags.pass_out);
        }
        slots.next();
        if !flags.is_ref || addr == 0 {
            return Ok(());
        }
        for (ix, ty) in fields(&arg.ty).into_iter().enumerate() {
            let slot = slots.next().ok_or(ErrorKind::BadGlkResult(selector))?;
            if flags.pass_out {
                let val = self.value_out(selector, ty, &slot)?;
                self.write_ref(addr, ix as u32, val)?;
            }
        }
        Ok(())
    }

    fn value_in(
        &self,
        selector: u32,
        ty: &ArgType,
        raw: u32,
        non_null: bool,
    ) -> ExecResult<GlkArg> {
        Ok(match *ty {
            ArgType::Int { signed: false } => GlkArg::Uint(raw),
            ArgType::Int { signed: true } => GlkArg::Sint(raw as i32),
            ArgType::Char(CharKind::Unsigned) => GlkArg::Uch(raw as u8),
            ArgType::Char(CharKind::Signed) => GlkArg::Sch(raw as u8 as i8),
            ArgType::Char(CharKind::Native) => GlkArg::Ch(raw as u8),
            ArgType::CString | ArgType::UniString if raw == 0 => {
                return Err(ErrorKind::NullGlkArgument(selector))
            }
            ArgType::CString => GlkArg::CharStr(self.memory.read_cstring(raw)?),
            ArgType::UniString => GlkArg::UniCharStr(self.memory.read_unistring(raw)?),
            ArgType::Object(_) if raw == 0 && non_null => {
                return Err(ErrorKind::NullGlkArgument(selector))
            }
            ArgType::Object(_) if raw == 0 => GlkArg::Opaque(None),
            ArgType::Object(class) => GlkArg::Opaque(Some(
                self.registry
                    .objects
                    .lookup(class, raw)
                    .ok_or(ErrorKind::BadObjectRef { class, id: raw })?,
            )),
            ArgType::Struct(_) => {
                return Err(ErrorKind::BadPrototype("struct passed by value".to_string()))
            }
        })
    }

    fn value_out(&self, selector: u32, ty: &ArgType, slot: &GlkArg) -> ExecResult<u32> {
        match (ty, slot) {
            (ArgType::Object(_), GlkArg::Opaque(None)) => Ok(0),
            (&ArgType::Object(class), &GlkArg::Opaque(Some(obj))) => self
                .registry
                .objects
                .id_of(class, obj)
                .ok_or(ErrorKind::BadObjectRef { class, id: 0 }),
            (_, slot) => slot.as_u32().ok_or(ErrorKind::BadGlkResult(selector)),
        }
    }

    fn read_ref(&mut self, addr: u32, ix: u32) -> ExecResult<u32> {
        if addr == STACK_REF {
            self.stack.pop32()
        } else {
            Ok(self.memory.read_u32(addr.wrapping_add(4 * ix))?)
        }
    }

    fn write_ref(&mut self, addr: u32, ix: u32, val: u32) -> ExecResult<()> {
        if addr == STACK_REF {
            self.stack.push32(val)
        } else {
            Ok(self.memory.write_u32(addr.wrapping_add(4 * ix), val)?)
        }
    }

    fn capture_array(
        &mut self,
        ty: &ArgType,
        addr: u32,
        len: u32,
        flags: Flags,
    ) -> ExecResult<ArrayRef> {
        match ty {
            ArgType::Char(_) => {
                self.memory.slice(addr, len)?;
                Ok(ArrayRef::Bytes { addr, len })
            }
            ArgType::Int { .. } => {
                // the whole array must be in memory before anything is allocated for it
                let bytes = len
                    .checked_mul(4)
                    .ok_or(ErrorKind::MemoryOutOfRange { addr, len: u32::MAX })?;
                self.memory.slice(addr, bytes)?;
                let data = if flags.pass_in {
                    (0..len)
                        .map(|ix| self.memory.read_u32(addr + 4 * ix))
                        .collect::<Result<Vec<u32>, _>>()?
                } else {
                    vec![0; len as usize]
                };
                let id = self.registry.arrays.capture(addr, data, flags.retained);
                Ok(ArrayRef::Ints { id })
            }
            _ => Err(ErrorKind::BadPrototype(format!("array of {:?}", ty))),
        }
    }

    // unretained integer arrays are written back (if passed out) and dropped
    fn release_array(&mut self, array: ArrayRef, pass_out: bool) -> ExecResult<()> {
        match array {
            ArrayRef::Bytes { .. } => Ok(()),
            ArrayRef::Ints { id } if self.registry.arrays.is_retained(id) => Ok(()),
            ArrayRef::Ints { id } => {
                let (addr, data) = self.registry.arrays.take(id).ok_or(ErrorKind::BadArrayRef)?;
                if pass_out {
                    write_words(&mut self.memory, addr, &data)?;
                }
                Ok(())
            }
        }
    }
}
