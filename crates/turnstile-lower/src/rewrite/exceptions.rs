//! `try` / `catch` / `finally`.
//!
//! A `finally` whose protected region cannot suspend stays a real
//! `finally`. One that can is extracted:
//!
//! ```text
//! before:
//! t_exc = null
//! t_branch = null                 // when branches leave the region
//! try {
//!   switch self.state { ... }    // resume into the protected region
//!   <body>
//! } catch t_exc {
//! }
//! entry:                          // disposal target of <body>
//! <finally body>
//! if (t_exc == null) goto no_exc
//! throw t_exc
//! no_exc:
//! <pending branches>
//! if self.dispose_mode goto <outer disposal>
//! ```
//!
//! A catch body that awaits cannot stay inside the `try`, so its handler
//! only records the exception and the body runs after the region:
//!
//! ```text
//! t_caught = null
//! try { <body> } catch t_caught {}
//! if (t_caught == null) goto end
//! <binding> = t_caught
//! <catch body>
//! end:
//! ```

use turnstile_ir::{
    BinaryOp, CatchClause, CatchRegion, LExpr, LPlace, LStmt, LabelId, Place, Region, Stmt,
    TryRegion,
};

use super::Rewriter;
use super::control::Frame;
use crate::disposal::DisposalScope;
use crate::errors::LoweringResult;

impl Rewriter<'_> {
    pub(super) fn lower_try(
        &mut self,
        body: &Stmt,
        catch: Option<&CatchClause>,
        finally: Option<&Stmt>,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        match finally {
            None => self.lower_try_catch(body, catch, out),
            Some(finally)
                if body.contains_suspension()
                    || catch.is_some_and(|catch| catch.body.contains_suspension()) =>
            {
                self.lower_extracted_finally(body, catch, finally, out)
            }
            Some(finally) => self.lower_real_finally(body, catch, finally, out),
        }
    }

    fn lower_try_catch(
        &mut self,
        body: &Stmt,
        catch: Option<&CatchClause>,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        let Some(catch) = catch else {
            return self.lower_stmt(body, out);
        };
        if catch.body.contains_suspension() {
            return self.lower_moved_catch(body, catch, out);
        }
        let (before, protected) = self.resumable_region(|this, inner| this.lower_stmt(body, inner))?;
        let handler = self.lower_catch(catch)?;
        if let Some(before) = before {
            out.push(LStmt::Label(before));
        }
        out.push(LStmt::Try(Box::new(TryRegion {
            body: protected,
            catch: Some(handler),
            finally: None,
        })));
        Ok(())
    }

    fn lower_real_finally(
        &mut self,
        body: &Stmt,
        catch: Option<&CatchClause>,
        finally: &Stmt,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        let after = self.label();
        let (protected, handler) = self.with_target(Some(after), |this| {
            let mut inner = Vec::new();
            this.lower_stmt(body, &mut inner)?;
            let handler = catch.map(|catch| this.lower_catch(catch)).transpose()?;
            Ok((Region::new(inner), handler))
        })?;
        let finally = self.with_target(None, |this| {
            let mut inner = Vec::new();
            this.lower_stmt(finally, &mut inner)?;
            Ok(Region::new(inner))
        })?;

        out.push(LStmt::Try(Box::new(TryRegion {
            body: protected,
            catch: handler,
            finally: Some(finally),
        })));
        out.push(LStmt::Label(after));
        self.propagate_disposal(out);
        Ok(())
    }

    fn lower_extracted_finally(
        &mut self,
        body: &Stmt,
        catch: Option<&CatchClause>,
        finally: &Stmt,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        let entry = self.label();
        let pending_exception = self.temp();

        self.frames.push(Frame::Finally {
            entry,
            branches: Vec::new(),
        });
        let protected = self.with_target(Some(entry), |this| {
            this.resumable_region(|this, inner| this.lower_try_catch(body, catch, inner))
        });
        let branches = match self.frames.pop() {
            Some(Frame::Finally { branches, .. }) => branches,
            _ => Vec::new(),
        };
        let (before, protected) = protected?;

        if let Some(before) = before {
            out.push(LStmt::Label(before));
        }
        // Pending temps live for the whole Advance; a loop may enter this
        // region again after an earlier pass left them set.
        out.push(LStmt::assign(LPlace::Temp(pending_exception), LExpr::null()));
        if !branches.is_empty() {
            let pending = self.pending_branch_temp();
            out.push(LStmt::assign(LPlace::Temp(pending), LExpr::null()));
        }
        out.push(LStmt::Try(Box::new(TryRegion {
            body: protected,
            catch: Some(CatchRegion {
                binding: Some(pending_exception),
                body: Region::default(),
            }),
            finally: None,
        })));
        out.push(LStmt::Label(entry));
        self.with_target(None, |this| this.lower_stmt(finally, out))?;

        let no_exception = self.label();
        out.push(LStmt::goto_if(
            LExpr::binary(
                BinaryOp::Eq,
                LExpr::Temp(pending_exception),
                LExpr::null(),
            ),
            no_exception,
        ));
        out.push(LStmt::Throw(LExpr::Temp(pending_exception)));
        out.push(LStmt::Label(no_exception));
        self.emit_pending_branches(branches, out);
        self.propagate_disposal(out);
        Ok(())
    }

    fn lower_moved_catch(
        &mut self,
        body: &Stmt,
        catch: &CatchClause,
        out: &mut Vec<LStmt>,
    ) -> LoweringResult<()> {
        let caught = self.temp();
        let (before, protected) = self.resumable_region(|this, inner| this.lower_stmt(body, inner))?;
        if let Some(before) = before {
            out.push(LStmt::Label(before));
        }
        out.push(LStmt::assign(LPlace::Temp(caught), LExpr::null()));
        out.push(LStmt::Try(Box::new(TryRegion {
            body: protected,
            catch: Some(CatchRegion {
                binding: Some(caught),
                body: Region::default(),
            }),
            finally: None,
        })));

        let end = self.label();
        out.push(LStmt::goto_if(
            LExpr::binary(BinaryOp::Eq, LExpr::Temp(caught), LExpr::null()),
            end,
        ));
        if let Some(local) = catch.binding {
            let place = self.lower_place(Place::Local(local))?;
            out.push(LStmt::assign(place, LExpr::Temp(caught)));
        }
        self.lower_stmt(&catch.body, out)?;
        out.push(LStmt::Label(end));
        Ok(())
    }

    fn lower_catch(&mut self, catch: &CatchClause) -> LoweringResult<CatchRegion> {
        let mut body = Vec::new();
        let binding = match catch.binding {
            None => None,
            Some(local) => match self.layout.hoisted(local) {
                Some(field) => {
                    let temp = self.temp();
                    body.push(LStmt::assign(LPlace::this_field(field), LExpr::Temp(temp)));
                    Some(temp)
                }
                None => Some(self.local_temp(local)),
            },
        };
        self.lower_stmt(&catch.body, &mut body)?;
        Ok(CatchRegion {
            binding,
            body: Region::new(body),
        })
    }

    /// Lower a protected region that resume dispatch may need to enter.
    ///
    /// Returns the label the enclosing dispatch jumps to for every state
    /// resumed inside, placed by the caller right before the region.
    fn resumable_region(
        &mut self,
        lower: impl FnOnce(&mut Self, &mut Vec<LStmt>) -> LoweringResult<()>,
    ) -> LoweringResult<(Option<LabelId>, Region)> {
        self.dispatch.push(Vec::new());
        let mut inner = Vec::new();
        let lowered = lower(self, &mut inner);
        let cases = self.dispatch.pop().unwrap_or_default();
        lowered?;

        if cases.is_empty() {
            return Ok((None, Region::new(inner)));
        }
        let before = self.label();
        for (state, _) in &cases {
            self.register_resume(*state, before);
        }
        inner.insert(
            0,
            LStmt::Dispatch {
                on: self.field(self.layout.state),
                cases,
            },
        );
        Ok((Some(before), Region::new(inner)))
    }

    /// After a cleanup region: keep unwinding if disposal is in progress.
    fn propagate_disposal(&self, out: &mut Vec<LStmt>) {
        if let Some(outer) = self.disposal.current() {
            out.push(LStmt::goto_if(
                self.field(self.layout.dispose_mode),
                outer,
            ));
        }
    }
}
