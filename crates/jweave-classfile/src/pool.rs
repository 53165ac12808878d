//! Constant pool: tag-discriminated entries, a read-side indexed pool, and a
//! write-side deduplicating builder.
//!
//! The builder can be seeded from a parsed pool. Seeding preserves every
//! original index and only appends, which is what lets untouched method
//! bodies be re-emitted as raw bytes: their embedded pool indices stay valid.

use std::collections::HashMap;

use crate::error::{ClassFileError, Result};
use crate::reader::{Reader, WriteBytes};

/// One constant pool entry. Indices reference other pool slots.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name: u16 },
    Str { utf8: u16 },
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType { descriptor: u16 },
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module { name: u16 },
    Package { name: u16 },
}

impl Constant {
    fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class { .. } => 7,
            Constant::Str { .. } => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef { .. } => 10,
            Constant::InterfaceMethodRef { .. } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType { .. } => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module { .. } => 19,
            Constant::Package { .. } => 20,
        }
    }

    /// Long and Double occupy two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.put_u1(self.tag());
        match self {
            Constant::Utf8(s) => {
                let bytes = s.as_bytes();
                out.put_u2(bytes.len() as u16);
                out.extend_from_slice(bytes);
            }
            Constant::Integer(v) => out.put_u4(*v as u32),
            Constant::Float(v) => out.put_u4(v.to_bits()),
            Constant::Long(v) => {
                out.put_u4((*v as u64 >> 32) as u32);
                out.put_u4(*v as u64 as u32);
            }
            Constant::Double(v) => {
                let bits = v.to_bits();
                out.put_u4((bits >> 32) as u32);
                out.put_u4(bits as u32);
            }
            Constant::Class { name } | Constant::Module { name } | Constant::Package { name } => {
                out.put_u2(*name)
            }
            Constant::Str { utf8 } => out.put_u2(*utf8),
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                out.put_u2(*class);
                out.put_u2(*name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                out.put_u2(*name);
                out.put_u2(*descriptor);
            }
            Constant::MethodHandle { kind, reference } => {
                out.put_u1(*kind);
                out.put_u2(*reference);
            }
            Constant::MethodType { descriptor } => out.put_u2(*descriptor),
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                out.put_u2(*bootstrap);
                out.put_u2(*name_and_type);
            }
        }
    }
}

/// Read-side indexed pool. Slot 0 is unused; Long/Double leave a `None` in
/// the following slot, per the class-file format.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Option<Constant>>,
}

impl ConstantPool {
    pub(crate) fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let count = r.read_u2()? as usize;
        let mut entries: Vec<Option<Constant>> = Vec::with_capacity(count);
        entries.push(None);

        let mut i = 1;
        while i < count {
            let tag = r.read_u1()?;
            let entry = match tag {
                1 => {
                    let len = r.read_u2()? as usize;
                    let bytes = r.read_bytes(len)?;
                    // Modified UTF-8 in practice; lossy decoding keeps
                    // pathological names from aborting the parse.
                    Constant::Utf8(String::from_utf8_lossy(bytes).into_owned())
                }
                3 => Constant::Integer(r.read_i4()?),
                4 => Constant::Float(f32::from_bits(r.read_u4()?)),
                5 => {
                    let high = r.read_u4()? as u64;
                    let low = r.read_u4()? as u64;
                    entries.push(Some(Constant::Long(((high << 32) | low) as i64)));
                    entries.push(None);
                    i += 2;
                    continue;
                }
                6 => {
                    let high = r.read_u4()? as u64;
                    let low = r.read_u4()? as u64;
                    entries.push(Some(Constant::Double(f64::from_bits((high << 32) | low))));
                    entries.push(None);
                    i += 2;
                    continue;
                }
                7 => Constant::Class { name: r.read_u2()? },
                8 => Constant::Str { utf8: r.read_u2()? },
                9 => Constant::FieldRef {
                    class: r.read_u2()?,
                    name_and_type: r.read_u2()?,
                },
                10 => Constant::MethodRef {
                    class: r.read_u2()?,
                    name_and_type: r.read_u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: r.read_u2()?,
                    name_and_type: r.read_u2()?,
                },
                12 => Constant::NameAndType {
                    name: r.read_u2()?,
                    descriptor: r.read_u2()?,
                },
                15 => Constant::MethodHandle {
                    kind: r.read_u1()?,
                    reference: r.read_u2()?,
                },
                16 => Constant::MethodType {
                    descriptor: r.read_u2()?,
                },
                17 => Constant::Dynamic {
                    bootstrap: r.read_u2()?,
                    name_and_type: r.read_u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: r.read_u2()?,
                    name_and_type: r.read_u2()?,
                },
                19 => Constant::Module { name: r.read_u2()? },
                20 => Constant::Package { name: r.read_u2()? },
                other => return Err(ClassFileError::BadConstantTag(other)),
            };
            entries.push(Some(entry));
            i += 1;
        }

        Ok(Self { entries })
    }

    /// Number of pool slots, including slot 0 and Long/Double padding.
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Result<&Constant> {
        if index == 0 {
            return Err(ClassFileError::BadPoolIndex(index));
        }
        self.entries
            .get(index as usize)
            .and_then(|e| e.as_ref())
            .ok_or(ClassFileError::BadPoolIndex(index))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s.as_str()),
            _ => Err(ClassFileError::BadPoolIndex(index)),
        }
    }

    /// Resolve a `Class` entry to its internal name.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name } => self.utf8(*name),
            _ => Err(ClassFileError::BadPoolIndex(index)),
        }
    }

    /// Resolve a `NameAndType` entry to `(name, descriptor)`.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(ClassFileError::BadPoolIndex(index)),
        }
    }

    /// Resolve a field/method/interface-method ref to
    /// `(owner, name, descriptor)`.
    pub fn member_ref(&self, index: u16) -> Result<(&str, &str, &str)> {
        let (class, name_and_type) = match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type),
            _ => return Err(ClassFileError::BadPoolIndex(index)),
        };
        let owner = self.class_name(class)?;
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok((owner, name, descriptor))
    }

}

/// Write-side pool builder with per-kind dedup maps.
///
/// `from_pool` seeds the builder with a parsed pool so that all original
/// indices survive emission unchanged; new entries are appended and
/// deduplicated against both old and new content.
#[derive(Debug, Default)]
pub struct PoolBuilder {
    entries: Vec<Option<Constant>>,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
    strings: HashMap<String, u16>,
    name_and_types: HashMap<(String, String), u16>,
    field_refs: HashMap<(String, String, String), u16>,
    method_refs: HashMap<(String, String, String), u16>,
    iface_method_refs: HashMap<(String, String, String), u16>,
    ints: HashMap<i32, u16>,
    floats: HashMap<u32, u16>,
    longs: HashMap<i64, u16>,
    doubles: HashMap<u64, u16>,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self {
            entries: vec![None],
            ..Default::default()
        }
    }

    /// Seed from a parsed pool, indexing its entries for dedup.
    pub fn from_pool(pool: &ConstantPool) -> Self {
        let mut entries = pool.entries.clone();
        if entries.is_empty() {
            entries.push(None);
        }
        let mut b = Self {
            entries,
            ..Default::default()
        };
        for idx in 1..pool.entries.len() {
            let Some(entry) = &pool.entries[idx] else {
                continue;
            };
            let idx = idx as u16;
            match entry {
                Constant::Utf8(s) => {
                    b.utf8.entry(s.clone()).or_insert(idx);
                }
                Constant::Integer(v) => {
                    b.ints.entry(*v).or_insert(idx);
                }
                Constant::Float(v) => {
                    b.floats.entry(v.to_bits()).or_insert(idx);
                }
                Constant::Long(v) => {
                    b.longs.entry(*v).or_insert(idx);
                }
                Constant::Double(v) => {
                    b.doubles.entry(v.to_bits()).or_insert(idx);
                }
                Constant::Class { name } => {
                    if let Ok(n) = pool.utf8(*name) {
                        b.classes.entry(n.to_string()).or_insert(idx);
                    }
                }
                Constant::Str { utf8 } => {
                    if let Ok(s) = pool.utf8(*utf8) {
                        b.strings.entry(s.to_string()).or_insert(idx);
                    }
                }
                Constant::NameAndType { .. } => {
                    if let Ok((n, d)) = pool.name_and_type(idx) {
                        b.name_and_types
                            .entry((n.to_string(), d.to_string()))
                            .or_insert(idx);
                    }
                }
                Constant::FieldRef { .. } => {
                    if let Ok((o, n, d)) = pool.member_ref(idx) {
                        b.field_refs
                            .entry((o.to_string(), n.to_string(), d.to_string()))
                            .or_insert(idx);
                    }
                }
                Constant::MethodRef { .. } => {
                    if let Ok((o, n, d)) = pool.member_ref(idx) {
                        b.method_refs
                            .entry((o.to_string(), n.to_string(), d.to_string()))
                            .or_insert(idx);
                    }
                }
                Constant::InterfaceMethodRef { .. } => {
                    if let Ok((o, n, d)) = pool.member_ref(idx) {
                        b.iface_method_refs
                            .entry((o.to_string(), n.to_string(), d.to_string()))
                            .or_insert(idx);
                    }
                }
                // Handles, method types, dynamics, modules and packages are
                // never synthesized by the weaver; their parsed entries are
                // carried through by index.
                _ => {}
            }
        }
        b
    }

    fn push(&mut self, entry: Constant) -> Result<u16> {
        let wide = entry.is_wide();
        let index = self.entries.len();
        if index + if wide { 1 } else { 0 } > u16::MAX as usize {
            return Err(ClassFileError::PoolOverflow);
        }
        self.entries.push(Some(entry));
        if wide {
            self.entries.push(None);
        }
        Ok(index as u16)
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16> {
        if let Some(&idx) = self.utf8.get(value) {
            return Ok(idx);
        }
        let idx = self.push(Constant::Utf8(value.to_string()))?;
        self.utf8.insert(value.to_string(), idx);
        Ok(idx)
    }

    pub fn class(&mut self, name: &str) -> Result<u16> {
        if let Some(&idx) = self.classes.get(name) {
            return Ok(idx);
        }
        let name_idx = self.utf8(name)?;
        let idx = self.push(Constant::Class { name: name_idx })?;
        self.classes.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn string(&mut self, value: &str) -> Result<u16> {
        if let Some(&idx) = self.strings.get(value) {
            return Ok(idx);
        }
        let utf8 = self.utf8(value)?;
        let idx = self.push(Constant::Str { utf8 })?;
        self.strings.insert(value.to_string(), idx);
        Ok(idx)
    }

    pub fn integer(&mut self, value: i32) -> Result<u16> {
        if let Some(&idx) = self.ints.get(&value) {
            return Ok(idx);
        }
        let idx = self.push(Constant::Integer(value))?;
        self.ints.insert(value, idx);
        Ok(idx)
    }

    pub fn float(&mut self, value: f32) -> Result<u16> {
        if let Some(&idx) = self.floats.get(&value.to_bits()) {
            return Ok(idx);
        }
        let idx = self.push(Constant::Float(value))?;
        self.floats.insert(value.to_bits(), idx);
        Ok(idx)
    }

    pub fn long(&mut self, value: i64) -> Result<u16> {
        if let Some(&idx) = self.longs.get(&value) {
            return Ok(idx);
        }
        let idx = self.push(Constant::Long(value))?;
        self.longs.insert(value, idx);
        Ok(idx)
    }

    pub fn double(&mut self, value: f64) -> Result<u16> {
        if let Some(&idx) = self.doubles.get(&value.to_bits()) {
            return Ok(idx);
        }
        let idx = self.push(Constant::Double(value))?;
        self.doubles.insert(value.to_bits(), idx);
        Ok(idx)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let key = (name.to_string(), descriptor.to_string());
        if let Some(&idx) = self.name_and_types.get(&key) {
            return Ok(idx);
        }
        let name_idx = self.utf8(name)?;
        let desc_idx = self.utf8(descriptor)?;
        let idx = self.push(Constant::NameAndType {
            name: name_idx,
            descriptor: desc_idx,
        })?;
        self.name_and_types.insert(key, idx);
        Ok(idx)
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let key = (owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(&idx) = self.field_refs.get(&key) {
            return Ok(idx);
        }
        let class = self.class(owner)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        let idx = self.push(Constant::FieldRef {
            class,
            name_and_type,
        })?;
        self.field_refs.insert(key, idx);
        Ok(idx)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let key = (owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(&idx) = self.method_refs.get(&key) {
            return Ok(idx);
        }
        let class = self.class(owner)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        let idx = self.push(Constant::MethodRef {
            class,
            name_and_type,
        })?;
        self.method_refs.insert(key, idx);
        Ok(idx)
    }

    pub fn interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let key = (owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(&idx) = self.iface_method_refs.get(&key) {
            return Ok(idx);
        }
        let class = self.class(owner)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        let idx = self.push(Constant::InterfaceMethodRef {
            class,
            name_and_type,
        })?;
        self.iface_method_refs.insert(key, idx);
        Ok(idx)
    }

    /// Serialize the pool: `constant_pool_count` followed by the entries.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.put_u2(self.entries.len() as u16);
        for entry in self.entries.iter().flatten() {
            entry.write(out);
        }
    }
}
