//! Definition parsing: `unit`, struct, function and variable definitions.

use super::Parser;
use crate::{
    PResult, SymbolId, Ty, TyBase,
    scope::{FnData, Storage, SymbolData, SymbolKind},
    token::{Delimiter, TokenKind, TokenLitKind},
    ty::ArrayLen,
};
use mcc_interface::{Ident, Result, Symbol, kw};
use mcc_vm::{Cell, Op, Program};

impl Parser<'_> {
    /// Parses a whole translation unit:
    /// `unit := (structDef | fnDef | varDef)* EOF`.
    ///
    /// Returns the compiled [`Program`]. The entry point is the `main`
    /// function, when one was defined.
    #[instrument(name = "parse_unit", level = "debug", skip_all)]
    pub fn parse_unit(&mut self) -> Result<Program> {
        // A lexing error cuts the token stream short; don't parse the rest.
        self.dcx().has_errors()?;

        while !self.token.is_eof() {
            if self.is_struct_def_start() {
                self.struct_def()?;
            } else if self.check_type_start() || self.token.is_keyword(kw::Void) {
                self.item_def()?;
            } else {
                return Err(self.err_here("syntax error"));
            }
        }
        debug_assert_eq!(self.symbols.depth(), 1, "unbalanced domains after parsing");

        let entry = match self.symbols.resolve(Symbol::intern("main")) {
            Some(id) => match &self.symbols[id].kind {
                SymbolKind::Fn(data) if data.builtin.is_none() => data.entry,
                _ => None,
            },
            None => None,
        };
        debug!(instrs = self.code.len(), globals = self.globals.len(), "parsed unit");
        Ok(Program {
            code: std::mem::take(&mut self.code),
            globals: std::mem::take(&mut self.globals),
            entry,
        })
    }

    /// Returns `true` if the current token starts a `typeBase`.
    pub(super) fn check_type_start(&self) -> bool {
        self.token.is_keyword(kw::Int)
            || self.token.is_keyword(kw::Double)
            || self.token.is_keyword(kw::Char)
            || self.token.is_keyword(kw::Struct)
    }

    /// Returns `true` for `struct ID {`, which starts a struct definition
    /// rather than a struct-typed variable.
    pub(super) fn is_struct_def_start(&self) -> bool {
        self.token.is_keyword(kw::Struct)
            && self.look_ahead(1).is_non_keyword_ident()
            && self.look_ahead(2).is_open_delim(Delimiter::Brace)
    }

    /// Parses a top-level function or variable definition, after dispatching
    /// on the token following the name.
    fn item_def(&mut self) -> PResult<()> {
        let ty = if self.eat_keyword(kw::Void) { Ty::VOID } else { self.type_base()? };
        let name = self.expect_ident("Missing function name")?;
        if self.check(&TokenKind::OpenDelim(Delimiter::Parenthesis)) {
            self.fn_def(ty, name)
        } else if ty.base == TyBase::Void {
            Err(self.err_here("syntax error"))
        } else {
            self.var_def(ty, name)
        }
    }

    /// Parses `typeBase := TYPE_INT | TYPE_DOUBLE | TYPE_CHAR | STRUCT ID`.
    pub(super) fn type_base(&mut self) -> PResult<Ty> {
        if self.eat_keyword(kw::Int) {
            Ok(Ty::INT)
        } else if self.eat_keyword(kw::Double) {
            Ok(Ty::DOUBLE)
        } else if self.eat_keyword(kw::Char) {
            Ok(Ty::CHAR)
        } else if self.eat_keyword(kw::Struct) {
            let name = self
                .expect_ident("Missing struct name: expected an identifier (ID) after 'struct'.")?;
            match self.symbols.resolve(name.name) {
                Some(id) if matches!(self.symbols[id].kind, SymbolKind::Struct { .. }) => {
                    Ok(Ty::strukt(id))
                }
                _ => Err(self.err_at(name.span, format!("Struct {name} is not defined."))),
            }
        } else {
            Err(self.err_here("expected a type name"))
        }
    }

    /// Parses `arrayDecl := LBRACKET INT? RBRACKET`, updating `ty` in place.
    /// Returns `true` if an array qualifier was present.
    pub(super) fn array_decl(&mut self, ty: &mut Ty) -> PResult<bool> {
        if !self.eat(&TokenKind::OpenDelim(Delimiter::Bracket)) {
            return Ok(false);
        }
        if let Some((TokenLitKind::Integer, symbol)) = self.token.lit() {
            let len = symbol
                .as_str()
                .parse::<u32>()
                .map_err(|_| self.err_here("invalid array size"))?;
            self.bump();
            ty.array = Some(ArrayLen::Fixed(len));
        } else {
            ty.array = Some(ArrayLen::Unspecified);
        }
        self.expect(
            &TokenKind::CloseDelim(Delimiter::Bracket),
            "you need a right bracket after array declaration.",
        )?;
        Ok(true)
    }

    /// Parses a full `varDef := typeBase ID arrayDecl? SEMICOLON`. Used for
    /// struct members and block-local declarations.
    pub(super) fn var_def_full(&mut self) -> PResult<()> {
        let ty = self.type_base()?;
        let name = self.expect_ident(
            "Expected an identifier (ID) after the type. Did you forget to name the variable?",
        )?;
        self.var_def(ty, name)
    }

    /// Parses the rest of a variable definition after its type and name,
    /// allocates storage and declares the symbol in the current domain.
    pub(super) fn var_def(&mut self, mut ty: Ty, name: Ident) -> PResult<()> {
        if self.array_decl(&mut ty)? && ty.array == Some(ArrayLen::Unspecified) {
            return Err(self.err_at(name.span, "A vector variable must have a dimension."));
        }
        self.expect(&TokenKind::Semi, "you need a semicolon after variable definition.")?;

        if self.symbols.find_in_current(name.name).is_some() {
            return Err(self.err_at(name.span, format!("Variable {name} is already defined.")));
        }

        let size = self.symbols.size_of(&ty);
        let storage = match self.owner {
            None => {
                let base = self.globals.len();
                self.globals.resize(base + size as usize, Cell::ZERO);
                Storage::Global(base)
            }
            Some(owner) => match &self.symbols[owner].kind {
                SymbolKind::Fn(data) => Storage::Local(data.locals_size),
                SymbolKind::Struct { .. } => {
                    let owner_ty = self.symbols[owner].ty;
                    Storage::Member(self.symbols.size_of(&owner_ty))
                }
                _ => unreachable!("variable owner is neither a function nor a struct"),
            },
        };

        let id = self.symbols.declare(SymbolData {
            name: name.name,
            span: name.span,
            ty,
            owner: self.owner,
            kind: SymbolKind::Var(storage),
        });
        match self.owner {
            Some(owner) if matches!(storage, Storage::Local(_)) => {
                let data = self.symbols[owner].fn_data_mut();
                data.locals.push(id);
                data.locals_size += size;
            }
            Some(owner) => self.symbols[owner].members_mut().push(id),
            None => {}
        }
        Ok(())
    }

    /// Parses `structDef := STRUCT ID LACC varDef* RACC SEMICOLON`.
    ///
    /// The struct symbol is created before its body is parsed so that
    /// member resolution and self-referential uses see it.
    #[instrument(name = "struct_def", level = "debug", skip_all)]
    pub(super) fn struct_def(&mut self) -> PResult<()> {
        self.bump(); // `struct`
        let name = self
            .expect_ident("Missing struct name: expected an identifier (ID) after 'struct'.")?;
        self.expect(&TokenKind::OpenDelim(Delimiter::Brace), "missing '{' in struct definition")?;

        if self.symbols.find_in_current(name.name).is_some() {
            return Err(self.err_at(name.span, format!("Struct {name} is already defined.")));
        }
        let id = self.symbols.declare(SymbolData {
            name: name.name,
            span: name.span,
            ty: Ty::VOID,
            owner: None,
            kind: SymbolKind::Struct { members: Vec::new() },
        });
        self.symbols[id].ty = Ty::strukt(id);

        self.symbols.enter_domain();
        let prev_owner = self.owner.replace(id);
        while self.check_type_start() {
            self.var_def_full()?;
        }
        self.expect(&TokenKind::CloseDelim(Delimiter::Brace), "missing '}' in struct definition")?;
        self.expect(&TokenKind::Semi, "missing ';' after struct definition")?;
        self.owner = prev_owner;
        self.symbols.exit_domain();
        Ok(())
    }

    /// Parses the rest of
    /// `fnDef := (typeBase | VOID) ID LPAR (fnParam (COMMA fnParam)*)? RPAR stmCompound`
    /// after its return type and name.
    #[instrument(name = "fn_def", level = "debug", skip_all, fields(name = %name))]
    fn fn_def(&mut self, ty: Ty, name: Ident) -> PResult<()> {
        self.bump(); // `(`

        if self.symbols.find_in_current(name.name).is_some() {
            return Err(self.err_at(name.span, format!("symbol redefinition: {name}")));
        }
        let fn_id = self.symbols.declare(SymbolData {
            name: name.name,
            span: name.span,
            ty,
            owner: None,
            kind: SymbolKind::Fn(FnData::default()),
        });

        let prev_owner = self.owner.replace(fn_id);
        self.symbols.enter_domain();

        if self.check_type_start() {
            self.fn_param(fn_id)?;
            while self.eat(&TokenKind::Comma) {
                if !self.check_type_start() {
                    return Err(
                        self.err_here("Missing function parameter after ',' or invalid parameter")
                    );
                }
                self.fn_param(fn_id)?;
            }
        }
        self.expect(
            &TokenKind::CloseDelim(Delimiter::Parenthesis),
            "Missing ')' from function definition",
        )?;

        // The locals count is patched in once the body is done.
        let enter = self.emit(Op::Enter(0));
        self.symbols[fn_id].fn_data_mut().entry = Some(enter);

        if !self.check(&TokenKind::OpenDelim(Delimiter::Brace)) {
            return Err(self.err_here("Missing function body"));
        }
        self.stm_compound(false)?;

        let data = self.symbols[fn_id].fn_data();
        let (locals_size, params_count) = (data.locals_size, data.params.len() as u32);
        self.code.patch_enter(enter, locals_size);
        if ty.base == TyBase::Void {
            self.emit(Op::RetVoid(params_count));
        } else {
            // All functions share one instruction arena; a body falling off
            // its end must trap instead of running into the next function.
            self.emit(Op::MissingRet);
        }

        self.symbols.exit_domain();
        self.owner = prev_owner;
        Ok(())
    }

    /// Parses `fnParam := typeBase ID arrayDecl?`.
    ///
    /// A parameter's declared array length is dropped: array parameters are
    /// passed as a base address and accept any length.
    fn fn_param(&mut self, fn_id: SymbolId) -> PResult<()> {
        let mut ty = self.type_base()?;
        let name = self.expect_ident("Expected identifier (parameter name) after type.")?;
        if self.array_decl(&mut ty)? {
            ty.array = Some(ArrayLen::Unspecified);
        }

        if self.symbols.find_in_current(name.name).is_some() {
            return Err(self.err_at(name.span, format!("Parameter {name} is already defined.")));
        }
        let index = self.symbols[fn_id].fn_data().params.len() as u32;
        let id = self.symbols.declare(SymbolData {
            name: name.name,
            span: name.span,
            ty,
            owner: Some(fn_id),
            kind: SymbolKind::Param { index },
        });
        self.symbols[fn_id].fn_data_mut().params.push(id);
        Ok(())
    }
}
