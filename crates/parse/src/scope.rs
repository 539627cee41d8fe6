//! The symbol table: an id arena of symbols plus a stack of lexical domains.
//!
//! Domains hold `(name, id)` bindings only; the symbol data itself lives in
//! the arena for the whole compile, so function parameter/local lists and
//! struct member lists stay valid after their lexical domain is popped.

use crate::{
    Ty,
    ty::{ArrayLen, TyBase},
};
use mcc_interface::{Span, Symbol};
use mcc_vm::{Builtin, InstrId};

index_vec::define_index_type! {
    /// The index of a symbol in the [`SymbolTable`] arena.
    pub struct SymbolId = u32;
}

/// Where a variable's storage lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    /// Base cell index in global memory.
    Global(usize),
    /// Cell offset inside the enclosing function's locals region.
    Local(u32),
    /// Cell offset inside the enclosing struct.
    Member(u32),
}

/// Function-specific symbol data.
#[derive(Clone, Debug, Default)]
pub struct FnData {
    /// Parameters, in declaration order.
    pub params: Vec<SymbolId>,
    /// Locals, in declaration order, including ones from nested blocks.
    pub locals: Vec<SymbolId>,
    /// Total size of the locals region, in cells.
    pub locals_size: u32,
    /// The function's `Enter` instruction. Set when the body starts.
    pub entry: Option<InstrId>,
    /// Set for host-provided builtins, which have no body.
    pub builtin: Option<Builtin>,
}

/// The kind-specific part of a symbol.
#[derive(Clone, Debug)]
pub enum SymbolKind {
    Var(Storage),
    Param {
        /// 0-based declaration index.
        index: u32,
    },
    Fn(FnData),
    Struct {
        /// Members, in declaration order.
        members: Vec<SymbolId>,
    },
}

/// A declared name: variable, parameter, function or struct type.
#[derive(Clone, Debug)]
pub struct SymbolData {
    pub name: Symbol,
    pub span: Span,
    pub ty: Ty,
    /// The enclosing function or struct symbol, if any.
    pub owner: Option<SymbolId>,
    pub kind: SymbolKind,
}

impl SymbolData {
    /// Returns the function data.
    ///
    /// # Panics
    ///
    /// Panics if the symbol is not a function.
    pub fn fn_data(&self) -> &FnData {
        match &self.kind {
            SymbolKind::Fn(data) => data,
            other => panic!("fn_data on {other:?}"),
        }
    }

    /// Returns the function data, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the symbol is not a function.
    pub fn fn_data_mut(&mut self) -> &mut FnData {
        match &mut self.kind {
            SymbolKind::Fn(data) => data,
            other => panic!("fn_data_mut on {other:?}"),
        }
    }

    /// Returns the struct member list.
    ///
    /// # Panics
    ///
    /// Panics if the symbol is not a struct.
    pub fn members(&self) -> &[SymbolId] {
        match &self.kind {
            SymbolKind::Struct { members } => members,
            other => panic!("members on {other:?}"),
        }
    }

    /// Returns the struct member list, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the symbol is not a struct.
    pub fn members_mut(&mut self) -> &mut Vec<SymbolId> {
        match &mut self.kind {
            SymbolKind::Struct { members } => members,
            other => panic!("members_mut on {other:?}"),
        }
    }
}

/// An ordered name-to-symbol mapping for one lexical scope.
#[derive(Debug, Default)]
struct Domain {
    bindings: Vec<(Symbol, SymbolId)>,
}

/// The symbol table: the symbol arena and the domain stack.
///
/// The bottom domain is the global one and is never popped.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: index_vec::IndexVec<SymbolId, SymbolData>,
    domains: Vec<Domain>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Creates a symbol table with the global domain in place.
    pub fn new() -> Self {
        Self { symbols: index_vec::IndexVec::new(), domains: vec![Domain::default()] }
    }

    /// Opens a new innermost domain.
    pub fn enter_domain(&mut self) {
        self.domains.push(Domain::default());
    }

    /// Drops the innermost domain and its bindings. The arena entries
    /// survive.
    ///
    /// # Panics
    ///
    /// Panics on an attempt to drop the global domain.
    pub fn exit_domain(&mut self) {
        assert!(self.domains.len() > 1, "cannot drop the global domain");
        self.domains.pop();
    }

    /// Returns the number of open domains. `1` means only the global domain.
    pub fn depth(&self) -> usize {
        self.domains.len()
    }

    /// Searches all domains, innermost first.
    pub fn resolve(&self, name: Symbol) -> Option<SymbolId> {
        self.domains.iter().rev().find_map(|d| Self::find_in_domain(d, name))
    }

    /// Searches only the innermost domain. Used to reject redeclarations.
    pub fn find_in_current(&self, name: Symbol) -> Option<SymbolId> {
        Self::find_in_domain(self.domains.last().unwrap(), name)
    }

    fn find_in_domain(domain: &Domain, name: Symbol) -> Option<SymbolId> {
        domain.bindings.iter().find(|(n, _)| *n == name).map(|&(_, id)| id)
    }

    /// Searches an owner's symbol list (struct members, function params).
    pub fn find_in_list(&self, list: &[SymbolId], name: Symbol) -> Option<SymbolId> {
        list.iter().copied().find(|&id| self.symbols[id].name == name)
    }

    /// Allocates a symbol in the arena without binding it to a domain.
    pub fn alloc(&mut self, data: SymbolData) -> SymbolId {
        self.symbols.push(data)
    }

    /// Allocates a symbol and binds it in the innermost domain.
    ///
    /// The caller has already checked for collisions.
    pub fn declare(&mut self, data: SymbolData) -> SymbolId {
        let name = data.name;
        let id = self.alloc(data);
        self.domains.last_mut().unwrap().bindings.push((name, id));
        id
    }

    /// Returns the size of a type, in VM cells. The sole size oracle: used
    /// for global allocation, local slot layout and struct member offsets.
    pub fn size_of(&self, ty: &Ty) -> u32 {
        let elem = match ty.base {
            TyBase::Int | TyBase::Double | TyBase::Char => 1,
            TyBase::Void => 0,
            TyBase::Struct => {
                let strukt = ty.strukt.expect("struct type without symbol");
                self[strukt].members().iter().map(|&m| self.size_of(&self[m].ty)).sum()
            }
        };
        match ty.array {
            None => elem,
            Some(ArrayLen::Unspecified) => 0,
            Some(ArrayLen::Fixed(n)) => elem * n,
        }
    }
}

impl std::ops::Index<SymbolId> for SymbolTable {
    type Output = SymbolData;

    #[inline]
    fn index(&self, id: SymbolId) -> &SymbolData {
        &self.symbols[id]
    }
}

impl std::ops::IndexMut<SymbolId> for SymbolTable {
    #[inline]
    fn index_mut(&mut self, id: SymbolId) -> &mut SymbolData {
        &mut self.symbols[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcc_interface::SessionGlobals;

    fn var(name: Symbol, ty: Ty) -> SymbolData {
        SymbolData {
            name,
            span: Span::DUMMY,
            ty,
            owner: None,
            kind: SymbolKind::Var(Storage::Global(0)),
        }
    }

    #[test]
    fn shadowing_and_domains() {
        SessionGlobals::new().set(|| {
            let name = Symbol::intern("x");
            let mut table = SymbolTable::new();
            let outer = table.declare(var(name, Ty::INT));
            assert_eq!(table.resolve(name), Some(outer));

            table.enter_domain();
            assert_eq!(table.resolve(name), Some(outer));
            assert_eq!(table.find_in_current(name), None);
            let inner = table.declare(var(name, Ty::DOUBLE));
            assert_eq!(table.resolve(name), Some(inner));

            table.exit_domain();
            assert_eq!(table.resolve(name), Some(outer));
            assert_eq!(table.depth(), 1);
        });
    }

    #[test]
    fn sizes() {
        SessionGlobals::new().set(|| {
            let mut table = SymbolTable::new();
            assert_eq!(table.size_of(&Ty::INT), 1);
            assert_eq!(table.size_of(&Ty::DOUBLE), 1);
            assert_eq!(table.size_of(&Ty::VOID), 0);

            let arr = Ty { base: TyBase::Int, strukt: None, array: Some(ArrayLen::Fixed(3)) };
            assert_eq!(table.size_of(&arr), 3);

            // struct P { int xs[3]; double d; }
            let strukt = table.declare(SymbolData {
                name: Symbol::intern("P"),
                span: Span::DUMMY,
                ty: Ty::VOID,
                owner: None,
                kind: SymbolKind::Struct { members: Vec::new() },
            });
            table[strukt].ty = Ty::strukt(strukt);
            let xs = table.alloc(SymbolData {
                name: Symbol::intern("xs"),
                span: Span::DUMMY,
                ty: arr,
                owner: Some(strukt),
                kind: SymbolKind::Var(Storage::Member(0)),
            });
            let d = table.alloc(SymbolData {
                name: Symbol::intern("d"),
                span: Span::DUMMY,
                ty: Ty::DOUBLE,
                owner: Some(strukt),
                kind: SymbolKind::Var(Storage::Member(3)),
            });
            match &mut table[strukt].kind {
                SymbolKind::Struct { members } => members.extend([xs, d]),
                _ => unreachable!(),
            }
            assert_eq!(table.size_of(&Ty::strukt(strukt)), 4);

            let arr_of_structs =
                Ty { base: TyBase::Struct, strukt: Some(strukt), array: Some(ArrayLen::Fixed(2)) };
            assert_eq!(table.size_of(&arr_of_structs), 8);
        });
    }
}
