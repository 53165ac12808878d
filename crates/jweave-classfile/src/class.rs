//! Whole-class parse and emit.
//!
//! Everything the rewriter does not understand is preserved byte-for-byte:
//! class and field attributes stay raw, and a method body stays `Raw` until
//! someone asks for it decoded. Because the emit-side pool is seeded from
//! the parsed pool and only appends, the indices embedded in raw payloads
//! remain valid, so untouched methods keep their original `StackMapTable`.

use crate::code::CodeBody;
use crate::error::{ClassFileError, Result};
use crate::flags;
use crate::pool::{ConstantPool, PoolBuilder};
use crate::reader::{Reader, WriteBytes};

const MAGIC: u32 = 0xCAFE_BABE;

/// An attribute carried without interpretation.
#[derive(Debug, Clone)]
pub struct RawAttribute {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<RawAttribute>,
}

/// A method's `Code` attribute payload. `Raw` is re-emitted verbatim.
#[derive(Debug, Clone)]
pub enum MethodBody {
    Raw(Vec<u8>),
    Decoded(CodeBody),
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// `None` for abstract and native methods.
    pub body: Option<MethodBody>,
    /// Attributes other than `Code`.
    pub attributes: Vec<RawAttribute>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name, slash-separated.
    pub name: String,
    /// `None` only for `java/lang/Object` and module-info.
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<RawAttribute>,
    pool: ConstantPool,
}

fn parse_attributes(r: &mut Reader<'_>, pool: &ConstantPool) -> Result<Vec<RawAttribute>> {
    let count = r.read_u2()?;
    let mut attrs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool.utf8(r.read_u2()?)?.to_string();
        let len = r.read_u4()? as usize;
        let data = r.read_bytes(len)?.to_vec();
        attrs.push(RawAttribute { name, data });
    }
    Ok(attrs)
}

fn write_attribute(out: &mut Vec<u8>, pool: &mut PoolBuilder, name: &str, data: &[u8]) -> Result<()> {
    out.put_u2(pool.utf8(name)?);
    out.put_u4(data.len() as u32);
    out.extend_from_slice(data);
    Ok(())
}

impl ClassFile {
    /// A fresh class with an empty pool, for synthesized classes.
    pub fn new(name: &str, super_name: &str, major_version: u16) -> Self {
        Self {
            minor_version: 0,
            major_version,
            access_flags: flags::ACC_PUBLIC | flags::ACC_SUPER,
            name: name.to_string(),
            super_name: Some(super_name.to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            pool: ConstantPool::default(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<ClassFile> {
        let mut r = Reader::new(data);
        let magic = r.read_u4()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.read_u2()?;
        let major_version = r.read_u2()?;
        let pool = ConstantPool::parse(&mut r)?;
        let access_flags = r.read_u2()?;
        let name = pool.class_name(r.read_u2()?)?.to_string();
        let super_index = r.read_u2()?;
        let super_name = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?.to_string())
        };

        let iface_count = r.read_u2()?;
        let mut interfaces = Vec::with_capacity(iface_count as usize);
        for _ in 0..iface_count {
            interfaces.push(pool.class_name(r.read_u2()?)?.to_string());
        }

        let field_count = r.read_u2()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let access_flags = r.read_u2()?;
            let name = pool.utf8(r.read_u2()?)?.to_string();
            let descriptor = pool.utf8(r.read_u2()?)?.to_string();
            let attributes = parse_attributes(&mut r, &pool)?;
            fields.push(FieldInfo {
                access_flags,
                name,
                descriptor,
                attributes,
            });
        }

        let method_count = r.read_u2()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let access_flags = r.read_u2()?;
            let name = pool.utf8(r.read_u2()?)?.to_string();
            let descriptor = pool.utf8(r.read_u2()?)?.to_string();
            let mut body = None;
            let mut attributes = Vec::new();
            for attr in parse_attributes(&mut r, &pool)? {
                if attr.name == "Code" && body.is_none() {
                    body = Some(MethodBody::Raw(attr.data));
                } else {
                    attributes.push(attr);
                }
            }
            methods.push(MethodInfo {
                access_flags,
                name,
                descriptor,
                body,
                attributes,
            });
        }

        let attributes = parse_attributes(&mut r, &pool)?;

        Ok(ClassFile {
            minor_version,
            major_version,
            access_flags,
            name,
            super_name,
            interfaces,
            fields,
            methods,
            attributes,
            pool,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & flags::ACC_INTERFACE != 0
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Decode method `index`'s body in place and hand back the decoded form.
    /// Idempotent; subsequent calls return the already-decoded body.
    pub fn decode_method_body(&mut self, index: usize) -> Result<&mut CodeBody> {
        let pool = &self.pool;
        let method = self
            .methods
            .get_mut(index)
            .ok_or_else(|| ClassFileError::Malformed(format!("no method at index {index}")))?;
        let body = method.body.as_mut().ok_or_else(|| {
            ClassFileError::Malformed(format!("method {} has no code", method.name))
        })?;
        if let MethodBody::Raw(data) = body {
            let decoded = CodeBody::decode(data, pool)?;
            *body = MethodBody::Decoded(decoded);
        }
        match body {
            MethodBody::Decoded(code) => Ok(code),
            MethodBody::Raw(_) => Err(ClassFileError::Malformed(
                "code decode did not materialize".to_string(),
            )),
        }
    }

    pub fn emit(&self) -> Result<Vec<u8>> {
        let mut pool = PoolBuilder::from_pool(&self.pool);

        // Assemble everything after the pool first; pool indices are
        // interned along the way and the pool is serialized afterward.
        let mut body: Vec<u8> = Vec::new();
        body.put_u2(self.access_flags);
        body.put_u2(pool.class(&self.name)?);
        match &self.super_name {
            Some(name) => body.put_u2(pool.class(name)?),
            None => body.put_u2(0),
        }
        body.put_u2(self.interfaces.len() as u16);
        for iface in &self.interfaces {
            body.put_u2(pool.class(iface)?);
        }

        body.put_u2(self.fields.len() as u16);
        for field in &self.fields {
            body.put_u2(field.access_flags);
            body.put_u2(pool.utf8(&field.name)?);
            body.put_u2(pool.utf8(&field.descriptor)?);
            body.put_u2(field.attributes.len() as u16);
            for attr in &field.attributes {
                write_attribute(&mut body, &mut pool, &attr.name, &attr.data)?;
            }
        }

        body.put_u2(self.methods.len() as u16);
        for method in &self.methods {
            body.put_u2(method.access_flags);
            body.put_u2(pool.utf8(&method.name)?);
            body.put_u2(pool.utf8(&method.descriptor)?);
            let attr_count = method.attributes.len() + usize::from(method.body.is_some());
            body.put_u2(attr_count as u16);
            if let Some(code) = &method.body {
                let payload = match code {
                    MethodBody::Raw(data) => data.clone(),
                    MethodBody::Decoded(decoded) => decoded.encode(&mut pool)?,
                };
                write_attribute(&mut body, &mut pool, "Code", &payload)?;
            }
            for attr in &method.attributes {
                write_attribute(&mut body, &mut pool, &attr.name, &attr.data)?;
            }
        }

        body.put_u2(self.attributes.len() as u16);
        for attr in &self.attributes {
            write_attribute(&mut body, &mut pool, &attr.name, &attr.data)?;
        }

        let mut out = Vec::with_capacity(body.len() + 1024);
        out.put_u4(MAGIC);
        out.put_u2(self.minor_version);
        out.put_u2(self.major_version);
        pool.write_to(&mut out);
        out.extend_from_slice(&body);
        Ok(out)
    }
}
