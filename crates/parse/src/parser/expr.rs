//! Expression parsing, typing and code emission.
//!
//! Every production returns `Ok(None)` when the current token cannot start
//! it, without consuming anything; committed paths report missing tokens
//! fatally. The assignment production speculates on its destination and
//! rolls the emitted code back when no `=` follows.

use super::Parser;
use crate::{
    PResult, Ty, TyBase,
    scope::{Storage, SymbolKind},
    token::{Delimiter, TokenKind, TokenLitKind},
    ty::ArrayLen,
};
use mcc_vm::{Cell, Op};

/// The result of an expression production: its type, whether it denotes a
/// storage location, and whether it is a constant (a non-assignable value:
/// call results, arithmetic results, array names).
#[derive(Clone, Copy, Debug)]
pub(crate) struct ExprRes {
    pub ty: Ty,
    pub lvalue: bool,
    pub constant: bool,
}

impl ExprRes {
    /// A computed value: not assignable, not a location.
    fn rvalue(ty: Ty) -> Self {
        Self { ty, lvalue: false, constant: true }
    }
}

impl Parser<'_> {
    /// Parses `expr := exprAssign`.
    #[instrument(name = "expr", level = "trace", skip_all)]
    pub(super) fn expr(&mut self) -> PResult<Option<ExprRes>> {
        self.expr_assign()
    }

    /// Parses `exprAssign := exprUnary ASSIGN exprAssign | exprOr`.
    ///
    /// The destination alternative is speculative: when no `=` follows the
    /// unary expression, both the token cursor and the emitted code are
    /// restored before re-parsing as `exprOr`.
    fn expr_assign(&mut self) -> PResult<Option<ExprRes>> {
        let snapshot = self.snapshot();
        if let Some(dst) = self.expr_unary()? {
            if self.eat(&TokenKind::Eq) {
                let Some(src) = self.expr_assign()? else {
                    return Err(
                        self.err_here("Expected expression after assignment operator '='.")
                    );
                };
                if !dst.lvalue {
                    return Err(self.err_here("the assign destination must be a left-value"));
                }
                if dst.constant {
                    return Err(self.err_here("the assign destination cannot be constant"));
                }
                if !dst.ty.can_be_scalar() {
                    return Err(self.err_here("the assign destination must be scalar"));
                }
                if !src.ty.can_be_scalar() {
                    return Err(self.err_here("the assign source must be scalar"));
                }
                if !src.ty.conv_to(&dst.ty) {
                    return Err(
                        self.err_here("the assign source cannot be converted to destination")
                    );
                }
                self.rvalue(&src);
                self.append_conv(&src.ty, &dst.ty);
                self.emit(if dst.ty.is_real() { Op::StoreReal } else { Op::StoreInt });
                return Ok(Some(ExprRes::rvalue(dst.ty)));
            }
        }
        self.rollback(snapshot);
        self.expr_or()
    }

    /// Parses `exprOr := exprAnd (OR exprAnd)*`.
    fn expr_or(&mut self) -> PResult<Option<ExprRes>> {
        let Some(mut lhs) = self.expr_and()? else { return Ok(None) };
        while self.eat(&TokenKind::OrOr) {
            self.rvalue(&lhs);
            self.normalize_logical(&lhs);
            let Some(rhs) = self.expr_and()? else {
                return Err(self.err_here("Expected expression before '||'."));
            };
            if Ty::arith(&lhs.ty, &rhs.ty).is_none() {
                return Err(self.err_here("invalid operand type for ||"));
            }
            self.rvalue(&rhs);
            self.normalize_logical(&rhs);
            self.emit(Op::OrInt);
            lhs = ExprRes::rvalue(Ty::INT);
        }
        Ok(Some(lhs))
    }

    /// Parses `exprAnd := exprEq (AND exprEq)*`.
    fn expr_and(&mut self) -> PResult<Option<ExprRes>> {
        let Some(mut lhs) = self.expr_eq()? else { return Ok(None) };
        while self.eat(&TokenKind::AndAnd) {
            self.rvalue(&lhs);
            self.normalize_logical(&lhs);
            let Some(rhs) = self.expr_eq()? else {
                return Err(self.err_here("Expected expression before '&&'."));
            };
            if Ty::arith(&lhs.ty, &rhs.ty).is_none() {
                return Err(self.err_here("invalid operand type for &&"));
            }
            self.rvalue(&rhs);
            self.normalize_logical(&rhs);
            self.emit(Op::AndInt);
            lhs = ExprRes::rvalue(Ty::INT);
        }
        Ok(Some(lhs))
    }

    /// Logical operands of base double are compared against 0.0 so that
    /// fractional values keep their truthiness; int and char operands are
    /// handled by the int logical opcodes directly.
    fn normalize_logical(&mut self, res: &ExprRes) {
        if res.ty.is_real() {
            self.emit(Op::PushReal(0.0));
            self.emit(Op::NeReal);
        }
    }

    /// Parses `exprEq := exprRel ((EQUAL | NOTEQ) exprRel)*`.
    fn expr_eq(&mut self) -> PResult<Option<ExprRes>> {
        let Some(mut lhs) = self.expr_rel()? else { return Ok(None) };
        loop {
            let negated = if self.eat(&TokenKind::EqEq) {
                false
            } else if self.eat(&TokenKind::Ne) {
                true
            } else {
                break;
            };
            self.rvalue(&lhs);
            let left_end = self.code.len();
            let Some(rhs) = self.expr_rel()? else {
                return Err(self.err_here("Expected expression after '==' or '!='."));
            };
            let Some(dst) = Ty::arith(&lhs.ty, &rhs.ty) else {
                return Err(self.err_here("invalid operand type for == or !="));
            };
            self.rvalue(&rhs);
            self.insert_conv_at(left_end, &lhs.ty, &dst);
            self.append_conv(&rhs.ty, &dst);
            self.emit(match (negated, dst.is_real()) {
                (false, false) => Op::EqInt,
                (false, true) => Op::EqReal,
                (true, false) => Op::NeInt,
                (true, true) => Op::NeReal,
            });
            lhs = ExprRes::rvalue(Ty::INT);
        }
        Ok(Some(lhs))
    }

    /// Parses
    /// `exprRel := exprAdd ((LESS | LESSEQ | GREATER | GREATEREQ) exprAdd)*`.
    fn expr_rel(&mut self) -> PResult<Option<ExprRes>> {
        let Some(mut lhs) = self.expr_add()? else { return Ok(None) };
        loop {
            let op = match self.token.kind {
                TokenKind::Lt => TokenKind::Lt,
                TokenKind::Le => TokenKind::Le,
                TokenKind::Gt => TokenKind::Gt,
                TokenKind::Ge => TokenKind::Ge,
                _ => break,
            };
            self.bump();
            self.rvalue(&lhs);
            let left_end = self.code.len();
            let Some(rhs) = self.expr_add()? else {
                return Err(self.err_here("Invalid expression after comparison"));
            };
            let Some(dst) = Ty::arith(&lhs.ty, &rhs.ty) else {
                return Err(self.err_here("Invalid operand type for <, <=, >, >="));
            };
            self.rvalue(&rhs);
            self.insert_conv_at(left_end, &lhs.ty, &dst);
            self.append_conv(&rhs.ty, &dst);
            self.emit(match (op, dst.is_real()) {
                (TokenKind::Lt, false) => Op::LtInt,
                (TokenKind::Lt, true) => Op::LtReal,
                (TokenKind::Le, false) => Op::LeInt,
                (TokenKind::Le, true) => Op::LeReal,
                (TokenKind::Gt, false) => Op::GtInt,
                (TokenKind::Gt, true) => Op::GtReal,
                (TokenKind::Ge, false) => Op::GeInt,
                (TokenKind::Ge, true) => Op::GeReal,
                _ => unreachable!(),
            });
            lhs = ExprRes::rvalue(Ty::INT);
        }
        Ok(Some(lhs))
    }

    /// Parses `exprAdd := exprMul ((ADD | SUB) exprMul)*`.
    fn expr_add(&mut self) -> PResult<Option<ExprRes>> {
        let Some(mut lhs) = self.expr_mul()? else { return Ok(None) };
        loop {
            let is_sub = if self.eat(&TokenKind::Plus) {
                false
            } else if self.eat(&TokenKind::Minus) {
                true
            } else {
                break;
            };
            self.rvalue(&lhs);
            let left_end = self.code.len();
            let Some(rhs) = self.expr_mul()? else {
                return Err(self.err_here("Invalid expression after operation"));
            };
            let Some(dst) = Ty::arith(&lhs.ty, &rhs.ty) else {
                return Err(self.err_here("Invalid operand type for + or -"));
            };
            self.rvalue(&rhs);
            self.insert_conv_at(left_end, &lhs.ty, &dst);
            self.append_conv(&rhs.ty, &dst);
            self.emit(match (is_sub, dst.is_real()) {
                (false, false) => Op::AddInt,
                (false, true) => Op::AddReal,
                (true, false) => Op::SubInt,
                (true, true) => Op::SubReal,
            });
            lhs = ExprRes::rvalue(dst);
        }
        Ok(Some(lhs))
    }

    /// Parses `exprMul := exprCast ((MUL | DIV) exprCast)*`.
    fn expr_mul(&mut self) -> PResult<Option<ExprRes>> {
        let Some(mut lhs) = self.expr_cast()? else { return Ok(None) };
        loop {
            let is_div = if self.eat(&TokenKind::Star) {
                false
            } else if self.eat(&TokenKind::Slash) {
                true
            } else {
                break;
            };
            self.rvalue(&lhs);
            let left_end = self.code.len();
            let Some(rhs) = self.expr_cast()? else {
                return Err(self.err_here("Invalid expression after operation"));
            };
            let Some(dst) = Ty::arith(&lhs.ty, &rhs.ty) else {
                return Err(self.err_here("Invalid operand type for * or /"));
            };
            self.rvalue(&rhs);
            self.insert_conv_at(left_end, &lhs.ty, &dst);
            self.append_conv(&rhs.ty, &dst);
            self.emit(match (is_div, dst.is_real()) {
                (false, false) => Op::MulInt,
                (false, true) => Op::MulReal,
                (true, false) => Op::DivInt,
                (true, true) => Op::DivReal,
            });
            lhs = ExprRes::rvalue(dst);
        }
        Ok(Some(lhs))
    }

    /// Parses `exprCast := LPAR typeBase arrayDecl? RPAR exprCast | exprUnary`.
    ///
    /// A `(` not followed by a type name is rolled back and handed to the
    /// unary production (a parenthesized expression).
    fn expr_cast(&mut self) -> PResult<Option<ExprRes>> {
        if self.check(&TokenKind::OpenDelim(Delimiter::Parenthesis)) {
            let snapshot = self.snapshot();
            self.bump();
            if self.check_type_start() {
                let mut ty = self.type_base()?;
                self.array_decl(&mut ty)?;
                self.expect(
                    &TokenKind::CloseDelim(Delimiter::Parenthesis),
                    "Missing closing parenthesis ')' after type in cast.",
                )?;
                let Some(operand) = self.expr_cast()? else {
                    return Err(self.err_here("Expected expression after type cast."));
                };
                if ty.base == TyBase::Struct {
                    return Err(self.err_here("cannot convert to a struct type"));
                }
                if operand.ty.base == TyBase::Struct {
                    return Err(self.err_here("cannot convert a struct"));
                }
                if operand.ty.is_array() && !ty.is_array() {
                    return Err(
                        self.err_here("an array can be converted only to another array")
                    );
                }
                if !operand.ty.is_array() && ty.is_array() {
                    return Err(
                        self.err_here("a scalar can be converted only to another scalar")
                    );
                }
                self.rvalue(&operand);
                self.append_conv(&operand.ty, &ty);
                return Ok(Some(ExprRes::rvalue(ty)));
            }
            self.rollback(snapshot);
        }
        self.expr_unary()
    }

    /// Parses `exprUnary := (SUB | NOT) exprUnary | exprPostfix`.
    fn expr_unary(&mut self) -> PResult<Option<ExprRes>> {
        if self.eat(&TokenKind::Minus) {
            let Some(operand) = self.expr_unary()? else {
                return Err(self.err_here("Expected expression after unary minus '-'."));
            };
            if !operand.ty.can_be_scalar() {
                return Err(self.err_here("unary - must have a scalar operand"));
            }
            self.rvalue(&operand);
            self.emit(if operand.ty.is_real() { Op::NegReal } else { Op::NegInt });
            return Ok(Some(ExprRes::rvalue(operand.ty)));
        }
        if self.eat(&TokenKind::Not) {
            let Some(operand) = self.expr_unary()? else {
                return Err(self.err_here("Expected expression after logical NOT '!'."));
            };
            if !operand.ty.can_be_scalar() {
                return Err(self.err_here("unary ! must have a scalar operand"));
            }
            self.rvalue(&operand);
            if operand.ty.is_real() {
                self.emit(Op::PushReal(0.0));
                self.emit(Op::EqReal);
            } else {
                self.emit(Op::NotInt);
            }
            return Ok(Some(ExprRes::rvalue(Ty::INT)));
        }
        self.expr_postfix()
    }

    /// Parses `exprPostfix := exprPrimary (LBRACKET expr RBRACKET | DOT ID)*`.
    fn expr_postfix(&mut self) -> PResult<Option<ExprRes>> {
        let Some(mut res) = self.expr_primary()? else { return Ok(None) };
        loop {
            if self.eat(&TokenKind::OpenDelim(Delimiter::Bracket)) {
                let Some(index) = self.expr()? else {
                    return Err(self.err_here("Expected expression inside brackets '[...]'."));
                };
                self.expect(
                    &TokenKind::CloseDelim(Delimiter::Bracket),
                    "Missing closing bracket ']'.",
                )?;
                if !res.ty.is_array() {
                    return Err(self.err_here("only an array can be indexed"));
                }
                if !index.ty.conv_to(&Ty::INT) {
                    return Err(self.err_here("the index is not convertible to int"));
                }
                // Scale the index by the element size and advance the base
                // address.
                self.rvalue(&index);
                self.append_conv(&index.ty, &Ty::INT);
                let elem = res.ty.elem();
                let size = self.symbols.size_of(&elem);
                if size != 1 {
                    self.emit(Op::PushInt(i64::from(size)));
                    self.emit(Op::MulInt);
                }
                self.emit(Op::Offset);
                res = ExprRes { ty: elem, lvalue: true, constant: false };
            } else if self.eat(&TokenKind::Dot) {
                let name =
                    self.expect_ident("Missing identifier after '.'. Expected a member name.")?;
                if res.ty.base != TyBase::Struct {
                    return Err(self.err_here("a field can only be selected from a struct"));
                }
                let strukt = res.ty.strukt.expect("struct type without symbol");
                let Some(member) =
                    self.symbols.find_in_list(self.symbols[strukt].members(), name.name)
                else {
                    return Err(self.err_at(
                        name.span,
                        format!(
                            "the structure {} does not have a field {name}",
                            self.symbols[strukt].name
                        ),
                    ));
                };
                let member_ty = self.symbols[member].ty;
                let offset = match self.symbols[member].kind {
                    SymbolKind::Var(Storage::Member(offset)) => offset,
                    ref other => unreachable!("struct member with kind {other:?}"),
                };
                if offset != 0 {
                    self.emit(Op::PushInt(i64::from(offset)));
                    self.emit(Op::Offset);
                }
                res = ExprRes { ty: member_ty, lvalue: true, constant: member_ty.is_array() };
            } else {
                return Ok(Some(res));
            }
        }
    }

    /// Parses `exprPrimary := ID (LPAR (expr (COMMA expr)*)? RPAR)?
    /// | INT | DOUBLE | CHAR | STRING | LPAR expr RPAR`.
    fn expr_primary(&mut self) -> PResult<Option<ExprRes>> {
        if let Some((kind, symbol)) = self.token.lit() {
            self.bump();
            return self.literal(kind, symbol).map(Some);
        }

        if let Some(name) = self.eat_ident() {
            let Some(id) = self.symbols.resolve(name.name) else {
                return Err(self.err_at(name.span, format!("Undefined id: {name}")));
            };
            if self.eat(&TokenKind::OpenDelim(Delimiter::Parenthesis)) {
                return self.call(name, id).map(Some);
            }
            return self.name_use(name, id).map(Some);
        }

        if self.check(&TokenKind::OpenDelim(Delimiter::Parenthesis)) {
            let snapshot = self.snapshot();
            self.bump();
            return match self.expr()? {
                Some(res) => {
                    self.expect(
                        &TokenKind::CloseDelim(Delimiter::Parenthesis),
                        "Missing ')' after expression",
                    )?;
                    Ok(Some(res))
                }
                None => {
                    self.rollback(snapshot);
                    Ok(None)
                }
            };
        }

        Ok(None)
    }

    fn literal(&mut self, kind: TokenLitKind, symbol: mcc_interface::Symbol) -> PResult<ExprRes> {
        match kind {
            TokenLitKind::Integer => {
                let value = symbol
                    .as_str()
                    .parse::<i64>()
                    .map_err(|_| self.err_at(self.prev_token.span, "invalid integer literal"))?;
                self.emit(Op::PushInt(value));
                Ok(ExprRes::rvalue(Ty::INT))
            }
            TokenLitKind::Rational => {
                let value = symbol.as_str().parse::<f64>().map_err(|_| {
                    self.err_at(self.prev_token.span, "invalid floating-point literal")
                })?;
                self.emit(Op::PushReal(value));
                Ok(ExprRes::rvalue(Ty::DOUBLE))
            }
            TokenLitKind::Char => {
                let c = symbol.as_str().chars().next().unwrap_or('\0');
                self.emit(Op::PushInt(c as i64));
                Ok(ExprRes::rvalue(Ty::CHAR))
            }
            TokenLitKind::Str => {
                // Lay the characters out in global memory, one per cell,
                // NUL-terminated, and push the base address.
                let base = self.globals.len();
                for c in symbol.as_str().chars() {
                    self.globals.push(Cell::from_int(c as i64));
                }
                self.globals.push(Cell::ZERO);
                self.emit(Op::Addr(base));
                let ty =
                    Ty { base: TyBase::Char, strukt: None, array: Some(ArrayLen::Unspecified) };
                Ok(ExprRes::rvalue(ty))
            }
        }
    }

    /// Emits a function call. The arguments are materialized left to right,
    /// each converted to its parameter's type.
    fn call(&mut self, name: mcc_interface::Ident, id: crate::SymbolId) -> PResult<ExprRes> {
        if !matches!(self.symbols[id].kind, SymbolKind::Fn(_)) {
            return Err(self.err_at(name.span, "Only a function can be called"));
        }
        let params = self.symbols[id].fn_data().params.clone();

        let mut index = 0;
        if !self.check(&TokenKind::CloseDelim(Delimiter::Parenthesis)) {
            loop {
                let Some(arg) = self.expr()? else {
                    if index == 0 {
                        break;
                    }
                    return Err(self.err_here("Missing expression after ',' in function call"));
                };
                if index >= params.len() {
                    return Err(self.err_here("Too many arguments in function call"));
                }
                let param_ty = self.symbols[params[index]].ty;
                if !arg.ty.conv_to(&param_ty) {
                    return Err(self.err_here(
                        "In call, cannot convert the argument type to the parameter type",
                    ));
                }
                self.rvalue(&arg);
                self.append_conv(&arg.ty, &param_ty);
                index += 1;
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::CloseDelim(Delimiter::Parenthesis), "Missing ')' in function call")?;
        if index < params.len() {
            return Err(self.err_here("Too few arguments in function call"));
        }

        let (builtin, entry) = {
            let data = self.symbols[id].fn_data();
            (data.builtin, data.entry)
        };
        if let Some(builtin) = builtin {
            self.emit(Op::CallExt(builtin));
        } else {
            let entry = entry.expect("call emitted before the callee's body");
            self.emit(Op::Call(entry));
        }
        Ok(ExprRes::rvalue(self.symbols[id].ty))
    }

    /// Emits the address of a variable or parameter use.
    fn name_use(&mut self, name: mcc_interface::Ident, id: crate::SymbolId) -> PResult<ExprRes> {
        enum Place {
            Var(Storage),
            Param { index: u32, params_count: i32 },
        }

        let ty = self.symbols[id].ty;
        let place = match self.symbols[id].kind {
            SymbolKind::Fn(_) => {
                return Err(self.err_at(name.span, "A function can only be called"));
            }
            SymbolKind::Struct { .. } => {
                return Err(self.err_at(name.span, format!("{name} is a type, not a value")));
            }
            SymbolKind::Var(storage) => Place::Var(storage),
            SymbolKind::Param { index } => {
                let owner = self.symbols[id].owner.expect("parameter without owner");
                let params_count = self.symbols[owner].fn_data().params.len() as i32;
                Place::Param { index, params_count }
            }
        };
        match place {
            Place::Var(Storage::Global(base)) => {
                self.emit(Op::Addr(base));
            }
            Place::Var(Storage::Local(offset)) => {
                self.emit(Op::FpAddr(offset as i32 + 1));
            }
            Place::Var(Storage::Member(_)) => {
                unreachable!("struct member resolved as a bare identifier")
            }
            Place::Param { index, params_count } => {
                self.emit(Op::FpAddr(index as i32 - params_count - 1));
                // An array parameter's cell holds the base address of the
                // caller's array; dereference it so indexing sees the
                // elements.
                if ty.is_array() {
                    self.emit(Op::LoadInt);
                }
            }
        }
        Ok(ExprRes { ty, lvalue: true, constant: ty.is_array() })
    }
}
