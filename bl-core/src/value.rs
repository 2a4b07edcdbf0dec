//! Compile-time values.
//!
//! [`ConstValue`] is both the operand of folded MIR constants and the
//! register representation of the VM. Integers are kept in a canonical
//! 64-bit form: truncated to the width of their type, then sign-extended
//! (signed types) or zero-extended (unsigned types). Two values of the same
//! type are therefore equal iff their payloads are bit-identical.

use std::fmt;

use crate::mir::FnId;
use crate::types::{LayoutError, TypeId, TypeKind, TypeTable};

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Void,
    Bool(bool),
    /// Canonical bits, see [`canonical_int`].
    Int(u64),
    F32(f32),
    F64(f64),
    /// Address in VM memory; `0` is null.
    Ptr(u64),
    Fn(FnId),
    Type(TypeId),
    /// Struct members, array elements or the `{ len, ptr }` pair of a slice.
    Aggregate(Vec<ConstValue>),
}

/// Truncate `raw` to `bits` and extend it back to 64 bits.
pub fn canonical_int(raw: u64, bits: u8, signed: bool) -> u64 {
    if bits >= 64 {
        return raw;
    }
    let shift = 64 - u32::from(bits);
    if signed {
        (((raw << shift) as i64) >> shift) as u64
    } else {
        (raw << shift) >> shift
    }
}

impl ConstValue {
    pub fn int(raw: u64, bits: u8, signed: bool) -> Self {
        ConstValue::Int(canonical_int(raw, bits, signed))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Raw integer bits; pointers answer with their address.
    pub fn as_bits(&self) -> Option<u64> {
        match self {
            ConstValue::Int(v) | ConstValue::Ptr(v) => Some(*v),
            ConstValue::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_bits().map(|v| v as i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::F32(v) => Some(f64::from(*v)),
            ConstValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeId> {
        match self {
            ConstValue::Type(ty) => Some(*ty),
            _ => None,
        }
    }

    /// Whether the value has the shape of `ty`; integers must also be in
    /// canonical form for its width.
    pub fn matches(&self, types: &TypeTable, ty: TypeId) -> bool {
        match (types.kind(ty), self) {
            (TypeKind::Void, ConstValue::Void) | (TypeKind::Bool, ConstValue::Bool(_)) => true,
            (TypeKind::Int { bits, signed }, ConstValue::Int(v)) => canonical_int(*v, *bits, *signed) == *v,
            (TypeKind::Enum(_), ConstValue::Int(v)) => {
                let (bits, signed) = types.int_info(ty).unwrap_or((64, false));
                canonical_int(*v, bits, signed) == *v
            }
            (TypeKind::Real { bits: 32 }, ConstValue::F32(_)) => true,
            (TypeKind::Real { bits: 64 }, ConstValue::F64(_)) => true,
            (TypeKind::Ptr(_) | TypeKind::Null, ConstValue::Ptr(_)) => true,
            (TypeKind::Fn { .. }, ConstValue::Fn(_) | ConstValue::Ptr(0)) => true,
            (TypeKind::Type, ConstValue::Type(_)) => true,
            (TypeKind::Slice(_), ConstValue::Aggregate(items)) => {
                matches!(items.as_slice(), [ConstValue::Int(_), ConstValue::Ptr(_)])
            }
            (TypeKind::Array { elem, len }, ConstValue::Aggregate(items)) => {
                items.len() as u64 == *len && items.iter().all(|item| item.matches(types, *elem))
            }
            (TypeKind::Struct(id), ConstValue::Aggregate(items)) => match &types.struct_def(*id).members {
                Some(members) => {
                    members.len() == items.len() && members.iter().zip(items).all(|(m, item)| item.matches(types, m.ty))
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Zero-initialized value of `ty`.
    pub fn zero(types: &TypeTable, ty: TypeId) -> Result<ConstValue, LayoutError> {
        let value = match types.kind(ty) {
            TypeKind::Void => ConstValue::Void,
            TypeKind::Bool => ConstValue::Bool(false),
            TypeKind::Int { .. } | TypeKind::Enum(_) => ConstValue::Int(0),
            TypeKind::Real { bits: 32 } => ConstValue::F32(0.0),
            TypeKind::Real { .. } => ConstValue::F64(0.0),
            TypeKind::Ptr(_) | TypeKind::Null | TypeKind::Fn { .. } => ConstValue::Ptr(0),
            TypeKind::Type => ConstValue::Type(TypeId::VOID),
            TypeKind::Slice(_) => ConstValue::Aggregate(vec![ConstValue::Int(0), ConstValue::Ptr(0)]),
            TypeKind::Array { elem, len } => {
                let len = usize::try_from(*len).map_err(|_| LayoutError::TooLarge(ty))?;
                let elem = ConstValue::zero(types, *elem)?;
                ConstValue::Aggregate(vec![elem; len])
            }
            TypeKind::Struct(id) => {
                let members = types.struct_def(*id).members.as_ref().ok_or(LayoutError::Incomplete(*id))?;
                let members = members
                    .iter()
                    .map(|m| ConstValue::zero(types, m.ty))
                    .collect::<Result<Vec<_>, _>>()?;
                ConstValue::Aggregate(members)
            }
        };
        Ok(value)
    }

    /// Write the value into `out` using the little-endian VM memory layout
    /// of `ty`. `out` must be exactly `layout(ty).size` bytes long.
    pub fn encode(&self, types: &TypeTable, ty: TypeId, out: &mut [u8]) -> Result<(), LayoutError> {
        match (types.kind(ty), self) {
            (TypeKind::Void, _) => {}
            (TypeKind::Bool, ConstValue::Bool(b)) => out[0] = u8::from(*b),
            (TypeKind::Real { bits: 32 }, ConstValue::F32(v)) => out.copy_from_slice(&v.to_bits().to_le_bytes()),
            (TypeKind::Real { .. }, ConstValue::F64(v)) => out.copy_from_slice(&v.to_bits().to_le_bytes()),
            (TypeKind::Fn { .. }, ConstValue::Fn(id)) => {
                out.copy_from_slice(&(u64::from(id.0) + 1).to_le_bytes());
            }
            (TypeKind::Type, ConstValue::Type(t)) => out.copy_from_slice(&u64::from(t.0).to_le_bytes()),
            (TypeKind::Array { elem, .. }, ConstValue::Aggregate(items)) => {
                let stride = types.elem_stride(*elem)? as usize;
                let size = types.layout(*elem)?.size as usize;
                for (i, item) in items.iter().enumerate() {
                    item.encode(types, *elem, &mut out[i * stride..i * stride + size])?;
                }
            }
            (TypeKind::Slice(_), ConstValue::Aggregate(items)) => {
                for (i, item) in items.iter().take(2).enumerate() {
                    let bits = item.as_bits().unwrap_or(0);
                    out[i * 8..i * 8 + 8].copy_from_slice(&bits.to_le_bytes());
                }
            }
            (TypeKind::Struct(id), ConstValue::Aggregate(items)) => {
                let offsets = types.member_offsets(*id)?;
                let members = types.struct_def(*id).members.as_ref().ok_or(LayoutError::Incomplete(*id))?;
                for ((member, offset), item) in members.iter().zip(offsets).zip(items) {
                    let size = types.layout(member.ty)?.size as usize;
                    let offset = offset as usize;
                    item.encode(types, member.ty, &mut out[offset..offset + size])?;
                }
            }
            // Integers, enums, pointers and null function values.
            (_, value) => {
                let bits = value.as_bits().unwrap_or(0).to_le_bytes();
                let len = out.len().min(8);
                out[..len].copy_from_slice(&bits[..len]);
            }
        }
        Ok(())
    }

    /// Read a value of `ty` back from VM memory.
    pub fn decode(types: &TypeTable, ty: TypeId, bytes: &[u8]) -> Result<ConstValue, LayoutError> {
        let word = |bytes: &[u8]| {
            let mut buf = [0u8; 8];
            let len = bytes.len().min(8);
            buf[..len].copy_from_slice(&bytes[..len]);
            u64::from_le_bytes(buf)
        };
        let value = match types.kind(ty) {
            TypeKind::Void => ConstValue::Void,
            TypeKind::Bool => ConstValue::Bool(bytes[0] != 0),
            TypeKind::Int { bits, signed } => ConstValue::int(word(bytes), *bits, *signed),
            TypeKind::Enum(_) => {
                let (bits, signed) = types.int_info(ty).unwrap_or((64, false));
                ConstValue::int(word(bytes), bits, signed)
            }
            TypeKind::Real { bits: 32 } => ConstValue::F32(f32::from_bits(word(bytes) as u32)),
            TypeKind::Real { .. } => ConstValue::F64(f64::from_bits(word(bytes))),
            TypeKind::Ptr(_) | TypeKind::Null => ConstValue::Ptr(word(bytes)),
            TypeKind::Fn { .. } => match word(bytes) {
                0 => ConstValue::Ptr(0),
                raw => ConstValue::Fn(FnId((raw - 1) as u32)),
            },
            TypeKind::Type => ConstValue::Type(TypeId(word(bytes) as u32)),
            TypeKind::Slice(_) => {
                ConstValue::Aggregate(vec![ConstValue::Int(word(&bytes[0..8])), ConstValue::Ptr(word(&bytes[8..16]))])
            }
            TypeKind::Array { elem, len } => {
                let stride = types.elem_stride(*elem)? as usize;
                let size = types.layout(*elem)?.size as usize;
                let len = usize::try_from(*len).map_err(|_| LayoutError::TooLarge(ty))?;
                let items = (0..len)
                    .map(|i| ConstValue::decode(types, *elem, &bytes[i * stride..i * stride + size]))
                    .collect::<Result<Vec<_>, _>>()?;
                ConstValue::Aggregate(items)
            }
            TypeKind::Struct(id) => {
                let offsets = types.member_offsets(*id)?;
                let members = types.struct_def(*id).members.as_ref().ok_or(LayoutError::Incomplete(*id))?;
                let items = members
                    .iter()
                    .zip(offsets)
                    .map(|(member, offset)| {
                        let size = types.layout(member.ty)?.size as usize;
                        let offset = offset as usize;
                        ConstValue::decode(types, member.ty, &bytes[offset..offset + size])
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                ConstValue::Aggregate(items)
            }
        };
        Ok(value)
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Void => write!(f, "void"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Int(v) => write!(f, "{}", *v as i64),
            ConstValue::F32(v) => write!(f, "{v}"),
            ConstValue::F64(v) => write!(f, "{v}"),
            ConstValue::Ptr(0) => write!(f, "null"),
            ConstValue::Ptr(addr) => write!(f, "0x{addr:x}"),
            ConstValue::Fn(id) => write!(f, "{id}"),
            ConstValue::Type(ty) => write!(f, "{ty}"),
            ConstValue::Aggregate(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
