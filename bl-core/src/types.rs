//! Core type system for BL.
//!
//! Types are interned: a structural descriptor ([`TypeKind`]) maps to exactly
//! one [`TypeId`], so comparing two ids is comparing two types. Structs and
//! enums are nominal; their ids are allocated when the declaration is first
//! seen and their bodies are filled in once analyzed, which lets a struct
//! point to itself and lets other declarations refer to it before its
//! members are known.

use std::collections::HashMap;

use crate::arena::{Arena, define_id};
use crate::ast::Ident;
use crate::span::Span;

define_id!(
    /// Interned type handle. Equal types always have the same `TypeId`.
    TypeId,
    "ty"
);
define_id!(StructId, "struct");
define_id!(EnumId, "enum");

impl TypeId {
    pub const VOID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const S8: TypeId = TypeId(2);
    pub const S16: TypeId = TypeId(3);
    pub const S32: TypeId = TypeId(4);
    pub const S64: TypeId = TypeId(5);
    pub const U8: TypeId = TypeId(6);
    pub const U16: TypeId = TypeId(7);
    pub const U32: TypeId = TypeId(8);
    pub const U64: TypeId = TypeId(9);
    pub const F32: TypeId = TypeId(10);
    pub const F64: TypeId = TypeId(11);
    /// The type of types.
    pub const TYPE: TypeId = TypeId(12);
    /// The type of the `null` literal.
    pub const NULL: TypeId = TypeId(13);
    pub const USIZE: TypeId = TypeId::U64;
}

/// Structural type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    Int { bits: u8, signed: bool },
    Real { bits: u8 },
    Ptr(TypeId),
    Array { elem: TypeId, len: u64 },
    /// Layout-compatible with `struct { len: s64, ptr: *T }`.
    Slice(TypeId),
    Fn { params: Vec<TypeId>, ret: TypeId },
    Struct(StructId),
    Enum(EnumId),
    Type,
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: Ident,
    pub ty: TypeId,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    /// `None` until the declaration has been analyzed.
    pub members: Option<Vec<StructMember>>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub base: TypeId,
    pub variants: Option<Vec<(Ident, u64)>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
}

impl Layout {
    const fn new(size: u64, align: u64) -> Self {
        Layout { size, align }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Struct members are not known yet.
    Incomplete(StructId),
    /// Struct contains itself by value.
    Recursive(StructId),
    /// Size does not fit the 64-bit address space.
    TooLarge(TypeId),
}

/// Ranking of implicit conversions; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConversionRank {
    Identity = 0,
    Widening = 1,
    PointerCompatible = 2,
}

/// Machine-level conversion selected for a cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    None,
    Bitcast,
    Sext,
    Zext,
    Trunc,
    FpTrunc,
    FpExt,
    FpToSi,
    FpToUi,
    SiToFp,
    UiToFp,
    PtrToInt,
    IntToPtr,
    PtrToBool,
    IntToBool,
}

/// Interner and registry of every type of a session.
#[derive(Debug)]
pub struct TypeTable {
    kinds: Arena<TypeId, TypeKind>,
    cache: HashMap<TypeKind, TypeId>,
    structs: Arena<StructId, StructDef>,
    enums: Arena<EnumId, EnumDef>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Create a table with the primitive types pre-interned at known ids.
    pub fn new() -> Self {
        let mut table = TypeTable {
            kinds: Arena::new(),
            cache: HashMap::new(),
            structs: Arena::new(),
            enums: Arena::new(),
        };

        // These MUST match the TypeId::* constants.
        let primitives = [
            (TypeKind::Void, TypeId::VOID),
            (TypeKind::Bool, TypeId::BOOL),
            (TypeKind::Int { bits: 8, signed: true }, TypeId::S8),
            (TypeKind::Int { bits: 16, signed: true }, TypeId::S16),
            (TypeKind::Int { bits: 32, signed: true }, TypeId::S32),
            (TypeKind::Int { bits: 64, signed: true }, TypeId::S64),
            (TypeKind::Int { bits: 8, signed: false }, TypeId::U8),
            (TypeKind::Int { bits: 16, signed: false }, TypeId::U16),
            (TypeKind::Int { bits: 32, signed: false }, TypeId::U32),
            (TypeKind::Int { bits: 64, signed: false }, TypeId::U64),
            (TypeKind::Real { bits: 32 }, TypeId::F32),
            (TypeKind::Real { bits: 64 }, TypeId::F64),
            (TypeKind::Type, TypeId::TYPE),
            (TypeKind::Null, TypeId::NULL),
        ];
        for (kind, expected) in primitives {
            let id = table.get_or_create(kind);
            debug_assert_eq!(id, expected);
        }
        table
    }

    /// Names under which primitive types are visible to user code.
    pub fn builtin_names() -> [(&'static str, TypeId); 14] {
        [
            ("void", TypeId::VOID),
            ("bool", TypeId::BOOL),
            ("s8", TypeId::S8),
            ("s16", TypeId::S16),
            ("s32", TypeId::S32),
            ("s64", TypeId::S64),
            ("u8", TypeId::U8),
            ("u16", TypeId::U16),
            ("u32", TypeId::U32),
            ("u64", TypeId::U64),
            ("usize", TypeId::USIZE),
            ("f32", TypeId::F32),
            ("f64", TypeId::F64),
            ("type", TypeId::TYPE),
        ]
    }

    /// Intern a descriptor. The same descriptor always yields the same id.
    pub fn get_or_create(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&ty) = self.cache.get(&kind) {
            return ty;
        }
        let ty = self.kinds.push(kind.clone());
        self.cache.insert(kind, ty);
        ty
    }

    pub fn kind(&self, ty: TypeId) -> &TypeKind {
        &self.kinds[ty]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn ptr(&mut self, pointee: TypeId) -> TypeId {
        self.get_or_create(TypeKind::Ptr(pointee))
    }

    pub fn slice(&mut self, elem: TypeId) -> TypeId {
        self.get_or_create(TypeKind::Slice(elem))
    }

    pub fn array(&mut self, elem: TypeId, len: u64) -> TypeId {
        self.get_or_create(TypeKind::Array { elem, len })
    }

    pub fn function(&mut self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.get_or_create(TypeKind::Fn { params, ret })
    }

    // -----------------------------------------------------------------
    // Nominal types
    // -----------------------------------------------------------------

    /// Allocate a struct whose members are filled in later.
    pub fn declare_struct(&mut self, name: impl Into<String>, span: Span) -> (StructId, TypeId) {
        let id = self.structs.push(StructDef {
            name: name.into(),
            members: None,
            span,
        });
        (id, self.get_or_create(TypeKind::Struct(id)))
    }

    fn struct_ty(&self, id: StructId) -> TypeId {
        self.cache.get(&TypeKind::Struct(id)).copied().unwrap_or(TypeId::VOID)
    }

    pub fn complete_struct(&mut self, id: StructId, members: Vec<StructMember>) {
        self.structs[id].members = Some(members);
    }

    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id]
    }

    pub fn declare_enum(&mut self, name: impl Into<String>, base: TypeId, span: Span) -> (EnumId, TypeId) {
        let id = self.enums.push(EnumDef {
            name: name.into(),
            base,
            variants: None,
            span,
        });
        (id, self.get_or_create(TypeKind::Enum(id)))
    }

    pub fn complete_enum(&mut self, id: EnumId, variants: Vec<(Ident, u64)>) {
        self.enums[id].variants = Some(variants);
    }

    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        &self.enums[id]
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Width and signedness of integer-like types (enums answer for their base).
    pub fn int_info(&self, ty: TypeId) -> Option<(u8, bool)> {
        match self.kind(ty) {
            TypeKind::Int { bits, signed } => Some((*bits, *signed)),
            TypeKind::Enum(id) => self.int_info(self.enums[*id].base),
            _ => None,
        }
    }

    pub fn is_int(&self, ty: TypeId) -> bool {
        matches!(self.kind(ty), TypeKind::Int { .. })
    }

    pub fn is_real(&self, ty: TypeId) -> bool {
        matches!(self.kind(ty), TypeKind::Real { .. })
    }

    pub fn is_numeric(&self, ty: TypeId) -> bool {
        self.is_int(ty) || self.is_real(ty)
    }

    pub fn is_ptr(&self, ty: TypeId) -> bool {
        matches!(self.kind(ty), TypeKind::Ptr(_))
    }

    pub fn pointee(&self, ty: TypeId) -> Option<TypeId> {
        match self.kind(ty) {
            TypeKind::Ptr(inner) => Some(*inner),
            _ => None,
        }
    }

    pub fn fn_sig(&self, ty: TypeId) -> Option<(&[TypeId], TypeId)> {
        match self.kind(ty) {
            TypeKind::Fn { params, ret } => Some((params, *ret)),
            _ => None,
        }
    }

    // -----------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------

    pub fn layout(&self, ty: TypeId) -> Result<Layout, LayoutError> {
        self.layout_inner(ty, &mut Vec::new())
    }

    fn layout_inner(&self, ty: TypeId, visiting: &mut Vec<StructId>) -> Result<Layout, LayoutError> {
        let layout = match self.kind(ty) {
            TypeKind::Void => Layout::new(0, 1),
            TypeKind::Bool => Layout::new(1, 1),
            TypeKind::Int { bits, .. } | TypeKind::Real { bits } => {
                let bytes = u64::from(*bits / 8);
                Layout::new(bytes, bytes)
            }
            TypeKind::Ptr(_) | TypeKind::Fn { .. } | TypeKind::Null | TypeKind::Type => Layout::new(8, 8),
            TypeKind::Slice(_) => Layout::new(16, 8),
            TypeKind::Array { elem, len } => {
                let elem = self.layout_inner(*elem, visiting)?;
                let size = elem.size.checked_mul(*len).ok_or(LayoutError::TooLarge(ty))?;
                Layout::new(size, elem.align)
            }
            TypeKind::Enum(id) => self.layout_inner(self.enums[*id].base, visiting)?,
            TypeKind::Struct(id) => {
                let offsets = self.struct_offsets_inner(*id, visiting)?;
                return Ok(offsets.1);
            }
        };
        Ok(layout)
    }

    /// Byte offsets of every member of a struct.
    pub fn member_offsets(&self, id: StructId) -> Result<Vec<u64>, LayoutError> {
        self.struct_offsets_inner(id, &mut Vec::new()).map(|(offsets, _)| offsets)
    }

    fn struct_offsets_inner(
        &self,
        id: StructId,
        visiting: &mut Vec<StructId>,
    ) -> Result<(Vec<u64>, Layout), LayoutError> {
        if visiting.contains(&id) {
            return Err(LayoutError::Recursive(id));
        }
        let members = self.structs[id]
            .members
            .as_ref()
            .ok_or(LayoutError::Incomplete(id))?;

        visiting.push(id);
        let mut offsets = Vec::with_capacity(members.len());
        let mut size = 0u64;
        let mut align = 1u64;
        for member in members {
            let layout = self.layout_inner(member.ty, visiting)?;
            size = checked_align_to(size, layout.align)
                .and_then(|offset| {
                    offsets.push(offset);
                    offset.checked_add(layout.size)
                })
                .ok_or(LayoutError::TooLarge(member.ty))?;
            align = align.max(layout.align);
        }
        visiting.pop();
        let size = checked_align_to(size, align).ok_or_else(|| LayoutError::TooLarge(self.struct_ty(id)))?;
        Ok((offsets, Layout::new(size, align)))
    }

    /// Number of scalar cells a value of `ty` holds, saturating. Arrays of
    /// zero-sized elements still count one cell per element.
    pub fn scalar_count(&self, ty: TypeId) -> u64 {
        match self.kind(ty) {
            TypeKind::Array { elem, len } => len.saturating_mul(self.scalar_count(*elem)),
            TypeKind::Struct(id) => match &self.structs[*id].members {
                Some(members) => members
                    .iter()
                    .fold(0u64, |total, m| total.saturating_add(self.scalar_count(m.ty))),
                None => 1,
            },
            _ => 1,
        }
    }

    /// Distance in bytes between consecutive elements of an array or slice.
    pub fn elem_stride(&self, elem: TypeId) -> Result<u64, LayoutError> {
        let layout = self.layout(elem)?;
        Ok(align_to(layout.size, layout.align))
    }

    // -----------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------

    /// Rank of the implicit conversion `from -> to`, `None` if only an
    /// explicit cast can convert.
    pub fn conversion_rank(&self, from: TypeId, to: TypeId) -> Option<ConversionRank> {
        if from == to {
            return Some(ConversionRank::Identity);
        }
        match (self.kind(from), self.kind(to)) {
            (
                TypeKind::Int { bits: fb, signed: fs },
                TypeKind::Int { bits: tb, signed: ts },
            ) => {
                // Every value of `from` must be representable in `to`.
                let lossless = tb > fb && (fs == ts || (!fs && *ts));
                lossless.then_some(ConversionRank::Widening)
            }
            (TypeKind::Real { bits: 32 }, TypeKind::Real { bits: 64 }) => Some(ConversionRank::Widening),
            (TypeKind::Null, TypeKind::Ptr(_)) => Some(ConversionRank::PointerCompatible),
            (TypeKind::Ptr(_), TypeKind::Ptr(target)) if *target == TypeId::U8 => {
                Some(ConversionRank::PointerCompatible)
            }
            _ => None,
        }
    }

    /// Common operand type of a binary operation, if one side converts
    /// implicitly into the other.
    pub fn common_type(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if a == b {
            return Some(a);
        }
        match (self.conversion_rank(a, b), self.conversion_rank(b, a)) {
            (Some(_), _) => Some(b),
            (_, Some(_)) => Some(a),
            _ => None,
        }
    }

    /// Conversion performed by an explicit `cast(to) expr`.
    pub fn cast_op(&self, from: TypeId, to: TypeId) -> Option<CastOp> {
        if from == to {
            return Some(CastOp::None);
        }
        let from_int = self.int_info(from);
        let to_int = self.int_info(to);
        let op = match (self.kind(from), self.kind(to)) {
            _ if from_int.is_some() && to_int.is_some() => {
                let (fb, fs) = from_int?;
                let (tb, _) = to_int?;
                if tb > fb {
                    if fs { CastOp::Sext } else { CastOp::Zext }
                } else if tb < fb {
                    CastOp::Trunc
                } else {
                    CastOp::Bitcast
                }
            }
            (TypeKind::Bool, _) if to_int.is_some() => CastOp::Zext,
            (_, TypeKind::Bool) if from_int.is_some() => CastOp::IntToBool,
            (TypeKind::Real { bits: fb }, TypeKind::Real { bits: tb }) => {
                if tb > fb { CastOp::FpExt } else { CastOp::FpTrunc }
            }
            (TypeKind::Real { .. }, _) if to_int.is_some() => {
                if to_int?.1 { CastOp::FpToSi } else { CastOp::FpToUi }
            }
            (_, TypeKind::Real { .. }) if from_int.is_some() => {
                if from_int?.1 { CastOp::SiToFp } else { CastOp::UiToFp }
            }
            (TypeKind::Ptr(_) | TypeKind::Null, TypeKind::Ptr(_)) => CastOp::Bitcast,
            (TypeKind::Ptr(_), TypeKind::Bool) => CastOp::PtrToBool,
            (TypeKind::Ptr(_), _) if to_int.is_some() => CastOp::PtrToInt,
            (_, TypeKind::Ptr(_)) if from_int.is_some() => CastOp::IntToPtr,
            _ => return None,
        };
        Some(op)
    }

    // -----------------------------------------------------------------
    // Display
    // -----------------------------------------------------------------

    /// Human-readable rendering for diagnostics.
    pub fn display(&self, ty: TypeId) -> String {
        match self.kind(ty) {
            TypeKind::Void => "void".into(),
            TypeKind::Bool => "bool".into(),
            TypeKind::Int { bits, signed } => format!("{}{}", if *signed { 's' } else { 'u' }, bits),
            TypeKind::Real { bits } => format!("f{bits}"),
            TypeKind::Ptr(inner) => format!("*{}", self.display(*inner)),
            TypeKind::Array { elem, len } => format!("[{len}]{}", self.display(*elem)),
            TypeKind::Slice(elem) => format!("[]{}", self.display(*elem)),
            TypeKind::Fn { params, ret } => {
                let params: Vec<String> = params.iter().map(|p| self.display(*p)).collect();
                format!("fn({}) {}", params.join(", "), self.display(*ret))
            }
            TypeKind::Struct(id) => self.structs[*id].name.clone(),
            TypeKind::Enum(id) => self.enums[*id].name.clone(),
            TypeKind::Type => "type".into(),
            TypeKind::Null => "null".into(),
        }
    }
}

pub(crate) fn align_to(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// [`align_to`] that reports overflow instead of wrapping.
pub(crate) fn checked_align_to(value: u64, align: u64) -> Option<u64> {
    if align <= 1 {
        Some(value)
    } else {
        value.div_ceil(align).checked_mul(align)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Interner;

    #[test]
    fn interning_is_idempotent() {
        let mut types = TypeTable::new();
        let a = types.ptr(TypeId::S32);
        let b = types.get_or_create(TypeKind::Ptr(TypeId::S32));
        let c = types.ptr(TypeId::S64);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let f1 = types.function(vec![TypeId::S32, a], TypeId::BOOL);
        let f2 = types.function(vec![TypeId::S32, b], TypeId::BOOL);
        assert_eq!(f1, f2);
    }

    #[test]
    fn primitives_sit_at_fixed_ids() {
        let mut types = TypeTable::new();
        assert_eq!(types.get_or_create(TypeKind::Int { bits: 32, signed: true }), TypeId::S32);
        assert_eq!(types.get_or_create(TypeKind::Real { bits: 64 }), TypeId::F64);
        assert_eq!(types.get_or_create(TypeKind::Null), TypeId::NULL);
    }

    #[test]
    fn nominal_structs_are_distinct() {
        let mut types = TypeTable::new();
        let (_, a) = types.declare_struct("A", Span::dummy());
        let (_, b) = types.declare_struct("B", Span::dummy());
        assert_ne!(a, b);
    }

    #[test]
    fn struct_layout_is_padded() {
        let mut interner = Interner::new();
        let mut types = TypeTable::new();
        let (id, ty) = types.declare_struct("Mixed", Span::dummy());
        assert_eq!(types.layout(ty), Err(LayoutError::Incomplete(id)));

        types.complete_struct(
            id,
            vec![
                StructMember { name: interner.intern("a"), ty: TypeId::U8 },
                StructMember { name: interner.intern("b"), ty: TypeId::S64 },
                StructMember { name: interner.intern("c"), ty: TypeId::S16 },
            ],
        );
        assert_eq!(types.member_offsets(id).unwrap(), vec![0, 8, 16]);
        assert_eq!(types.layout(ty).unwrap(), Layout { size: 24, align: 8 });
    }

    #[test]
    fn self_pointer_is_fine_but_self_value_is_recursive() {
        let mut interner = Interner::new();
        let mut types = TypeTable::new();
        let (id, ty) = types.declare_struct("Node", Span::dummy());
        let ptr = types.ptr(ty);
        types.complete_struct(id, vec![StructMember { name: interner.intern("next"), ty: ptr }]);
        assert_eq!(types.layout(ty).unwrap(), Layout { size: 8, align: 8 });

        let (bad, bad_ty) = types.declare_struct("Bad", Span::dummy());
        types.complete_struct(bad, vec![StructMember { name: interner.intern("me"), ty: bad_ty }]);
        assert_eq!(types.layout(bad_ty), Err(LayoutError::Recursive(bad)));
    }

    #[test]
    fn oversized_layouts_are_reported() {
        let mut interner = Interner::new();
        let mut types = TypeTable::new();
        let huge = types.array(TypeId::S64, 1 << 62);
        assert_eq!(types.layout(huge), Err(LayoutError::TooLarge(huge)));

        let half = types.array(TypeId::U8, u64::MAX / 2 + 1);
        assert!(types.layout(half).is_ok());
        let (id, ty) = types.declare_struct("Twice", Span::dummy());
        types.complete_struct(
            id,
            vec![
                StructMember { name: interner.intern("a"), ty: half },
                StructMember { name: interner.intern("b"), ty: half },
            ],
        );
        assert_eq!(types.layout(ty), Err(LayoutError::TooLarge(half)));
    }

    #[test]
    fn conversion_ranks() {
        let mut types = TypeTable::new();
        let p = types.ptr(TypeId::S32);
        let byte_ptr = types.ptr(TypeId::U8);
        assert_eq!(types.conversion_rank(TypeId::S32, TypeId::S32), Some(ConversionRank::Identity));
        assert_eq!(types.conversion_rank(TypeId::S32, TypeId::S64), Some(ConversionRank::Widening));
        assert_eq!(types.conversion_rank(TypeId::U8, TypeId::S16), Some(ConversionRank::Widening));
        assert_eq!(types.conversion_rank(TypeId::S8, TypeId::U16), None);
        assert_eq!(types.conversion_rank(TypeId::S64, TypeId::S32), None);
        assert_eq!(types.conversion_rank(TypeId::S32, TypeId::F64), None);
        assert_eq!(types.conversion_rank(TypeId::F32, TypeId::F64), Some(ConversionRank::Widening));
        assert_eq!(types.conversion_rank(TypeId::NULL, p), Some(ConversionRank::PointerCompatible));
        assert_eq!(types.conversion_rank(p, byte_ptr), Some(ConversionRank::PointerCompatible));
        assert_eq!(types.conversion_rank(byte_ptr, p), None);
        assert_eq!(types.common_type(TypeId::S16, TypeId::S64), Some(TypeId::S64));
    }

    #[test]
    fn cast_ops() {
        let mut types = TypeTable::new();
        let p = types.ptr(TypeId::S32);
        assert_eq!(types.cast_op(TypeId::S8, TypeId::S32), Some(CastOp::Sext));
        assert_eq!(types.cast_op(TypeId::U8, TypeId::S32), Some(CastOp::Zext));
        assert_eq!(types.cast_op(TypeId::S64, TypeId::U8), Some(CastOp::Trunc));
        assert_eq!(types.cast_op(TypeId::F64, TypeId::S32), Some(CastOp::FpToSi));
        assert_eq!(types.cast_op(TypeId::U32, TypeId::F32), Some(CastOp::UiToFp));
        assert_eq!(types.cast_op(p, TypeId::U64), Some(CastOp::PtrToInt));
        assert_eq!(types.cast_op(TypeId::BOOL, TypeId::S32), Some(CastOp::Zext));
        assert_eq!(types.cast_op(TypeId::VOID, TypeId::S32), None);
    }

    #[test]
    fn display_renders_nested_types() {
        let mut types = TypeTable::new();
        let p = types.ptr(TypeId::U8);
        let arr = types.array(p, 4);
        let f = types.function(vec![arr], TypeId::S32);
        assert_eq!(types.display(f), "fn([4]*u8) s32");
    }
}
