//! Statement parsing and control-flow emission.

use super::Parser;
use crate::{
    PResult, Ty, TyBase,
    token::{Delimiter, TokenKind},
};
use mcc_interface::kw;
use mcc_vm::Op;

impl Parser<'_> {
    /// Parses `stmCompound := LACC (structDef | varDef | stm)* RACC`.
    ///
    /// `new_domain` is `false` for function bodies, which share their scope
    /// with the parameters.
    pub(super) fn stm_compound(&mut self, new_domain: bool) -> PResult<()> {
        self.expect(&TokenKind::OpenDelim(Delimiter::Brace), "missing '{'")?;
        if new_domain {
            self.symbols.enter_domain();
        }
        loop {
            if self.check(&TokenKind::CloseDelim(Delimiter::Brace)) {
                break;
            }
            if self.is_struct_def_start() {
                self.struct_def()?;
            } else if self.check_type_start() {
                self.var_def_full()?;
            } else if !self.stm()? {
                break;
            }
        }
        self.expect(
            &TokenKind::CloseDelim(Delimiter::Brace),
            "Expected right curly brace '}' after compound statement.",
        )?;
        if new_domain {
            self.symbols.exit_domain();
        }
        Ok(())
    }

    /// Parses a single statement. Returns `false` without consuming
    /// anything when the current token cannot start one.
    pub(super) fn stm(&mut self) -> PResult<bool> {
        if self.check(&TokenKind::OpenDelim(Delimiter::Brace)) {
            self.stm_compound(true)?;
            return Ok(true);
        }
        if self.eat_keyword(kw::If) {
            self.if_stm()?;
            return Ok(true);
        }
        if self.eat_keyword(kw::While) {
            self.while_stm()?;
            return Ok(true);
        }
        if self.eat_keyword(kw::Return) {
            self.return_stm()?;
            return Ok(true);
        }
        if self.eat(&TokenKind::Semi) {
            return Ok(true);
        }

        // Expression statement.
        match self.expr()? {
            Some(res) => {
                // Every non-void expression leaves one value (or address)
                // on the stack; discard it.
                if res.ty.base != TyBase::Void {
                    self.emit(Op::Drop);
                }
                self.expect(&TokenKind::Semi, "Expected semicolon ';' after expression.")?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// `IF LPAR expr RPAR stm (ELSE stm)?`:
    ///
    /// ```text
    /// <cond> ; JumpFalse A ; <then> ; Jump B ; A: Nop ; <else> ; B: Nop
    /// ```
    fn if_stm(&mut self) -> PResult<()> {
        self.expect(
            &TokenKind::OpenDelim(Delimiter::Parenthesis),
            "Expected left parenthesis '(' after 'if'.",
        )?;
        let Some(cond) = self.expr()? else {
            return Err(self.err_here("Expected expression inside parentheses after 'if'."));
        };
        if !cond.ty.can_be_scalar() {
            return Err(self.err_here("the if condition must be a scalar value"));
        }
        self.expect(
            &TokenKind::CloseDelim(Delimiter::Parenthesis),
            "Expected right parenthesis ')' after condition in 'if'.",
        )?;
        self.rvalue(&cond);
        self.append_conv(&cond.ty, &Ty::INT);

        // Target patched below.
        let jf_target = self.code.next_id();
        let jf = self.emit(Op::JumpFalse(jf_target));
        if !self.stm()? {
            return Err(self.err_here("you need a statement after if."));
        }
        if self.eat_keyword(kw::Else) {
            let jmp_target = self.code.next_id();
            let jmp = self.emit(Op::Jump(jmp_target));
            let else_start = self.emit(Op::Nop);
            self.code.patch_target(jf, else_start);
            if !self.stm()? {
                return Err(self.err_here("you need a statement after else."));
            }
            let end = self.emit(Op::Nop);
            self.code.patch_target(jmp, end);
        } else {
            let end = self.emit(Op::Nop);
            self.code.patch_target(jf, end);
        }
        Ok(())
    }

    /// `WHILE LPAR expr RPAR stm`:
    ///
    /// ```text
    /// START: <cond> ; JumpFalse END ; <body> ; Jump START ; END: Nop
    /// ```
    fn while_stm(&mut self) -> PResult<()> {
        let cond_start = self.code.next_id();
        self.expect(
            &TokenKind::OpenDelim(Delimiter::Parenthesis),
            "Expected left parenthesis '(' after 'while'.",
        )?;
        let Some(cond) = self.expr()? else {
            return Err(self.err_here("Expected expression inside parentheses after 'while'."));
        };
        if !cond.ty.can_be_scalar() {
            return Err(self.err_here("the while condition must be a scalar value"));
        }
        self.expect(
            &TokenKind::CloseDelim(Delimiter::Parenthesis),
            "Expected right parenthesis ')' after condition in 'while'.",
        )?;
        self.rvalue(&cond);
        self.append_conv(&cond.ty, &Ty::INT);

        let jf_target = self.code.next_id();
        let jf = self.emit(Op::JumpFalse(jf_target));
        if !self.stm()? {
            return Err(self.err_here("you need a statement after while."));
        }
        self.emit(Op::Jump(cond_start));
        let end = self.emit(Op::Nop);
        self.code.patch_target(jf, end);
        Ok(())
    }

    /// `RETURN expr? SEMICOLON`. Enforces agreement between the function's
    /// return type and the presence and type of the value.
    fn return_stm(&mut self) -> PResult<()> {
        let owner = self.owner.expect("return statement outside of a function");
        let fn_ty = self.symbols[owner].ty;
        let params_count = self.symbols[owner].fn_data().params.len() as u32;

        match self.expr()? {
            Some(res) => {
                if fn_ty.base == TyBase::Void {
                    return Err(self.err_here("a void function cannot return a value"));
                }
                if !res.ty.can_be_scalar() {
                    return Err(self.err_here("the return value must be a scalar value"));
                }
                if !res.ty.conv_to(&fn_ty) {
                    return Err(self.err_here(
                        "cannot convert the return expression type to the function return type",
                    ));
                }
                self.rvalue(&res);
                self.append_conv(&res.ty, &fn_ty);
                self.emit(Op::Ret(params_count));
            }
            None => {
                if fn_ty.base != TyBase::Void {
                    return Err(self.err_here("a non-void function must return a value"));
                }
                self.emit(Op::RetVoid(params_count));
            }
        }
        self.expect(&TokenKind::Semi, "missing ; at return statement")
    }
}
