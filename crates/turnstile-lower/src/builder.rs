//! Assemble the state-machine type around a rewritten Advance body.

use turnstile_ir::{
    BinaryOp, FieldId, Flavor, LExpr, LPlace, LStmt, LabelId, MethodBody, MethodDecl, ParamId,
    Receiver, Region, ResumeState, RuntimeFault, StateMachineType, TempId,
};

use crate::layout::FieldLayout;
use crate::rewrite::RewrittenBody;

pub fn build_machine(
    method: &MethodDecl,
    flavor: Flavor,
    layout: FieldLayout,
    body: RewrittenBody,
) -> StateMachineType {
    let synth = Synthesizer {
        layout: &layout,
        flavor,
    };
    let kickoff = synth.kickoff();
    let current = synth.current();
    let request_dispose = synth.request_dispose();
    let get_enumerator = match flavor {
        Flavor::Enumerator => None,
        Flavor::Reiterable => Some(synth.get_enumerator()),
    };

    tracing::debug!(
        "build_machine: {} ({flavor}) with {} fields and {} resume states",
        method.name,
        layout.fields().len(),
        body.states.len()
    );

    StateMachineType {
        name: method.name.clone(),
        flavor,
        fields: layout.into_fields(),
        kickoff,
        advance: body.advance,
        current,
        request_dispose,
        get_enumerator,
        states: body.states,
    }
}

struct Synthesizer<'a> {
    layout: &'a FieldLayout,
    flavor: Flavor,
}

fn this(field: FieldId) -> LExpr {
    LExpr::this_field(field)
}

fn on(temp: TempId, field: FieldId) -> LPlace {
    LPlace::Field {
        receiver: Receiver::Temp(temp),
        field,
    }
}

fn read(temp: TempId, field: FieldId) -> LExpr {
    LExpr::Field {
        receiver: Receiver::Temp(temp),
        field,
    }
}

impl Synthesizer<'_> {
    fn params(&self) -> impl Iterator<Item = ParamId> {
        (0..self.layout.param_count() as u32).map(ParamId)
    }

    fn state_cmp(&self, op: BinaryOp, state: ResumeState) -> LExpr {
        LExpr::binary(op, this(self.layout.state), LExpr::state(state))
    }

    /// Replacement body of the generator method itself.
    fn kickoff(&self) -> MethodBody {
        let instance = TempId(0);
        let initial = match self.flavor {
            Flavor::Enumerator => ResumeState::NOT_STARTED,
            Flavor::Reiterable => ResumeState::INITIAL_ENUMERABLE,
        };
        let mut stmts = vec![
            LStmt::assign(LPlace::Temp(instance), LExpr::NewInstance),
            LStmt::assign(on(instance, self.layout.state), LExpr::state(initial)),
        ];
        for param in self.params() {
            let field = match self.flavor {
                Flavor::Enumerator => self.layout.param(param),
                Flavor::Reiterable => self.layout.proxy(param),
            };
            if let Some(field) = field {
                stmts.push(LStmt::assign(on(instance, field), LExpr::Arg(param.0)));
            }
        }
        stmts.push(LStmt::ReturnValue(LExpr::Temp(instance)));

        MethodBody {
            arity: self.layout.param_count() as u32,
            temps: 1,
            body: Region::new(stmts),
        }
    }

    fn current(&self) -> MethodBody {
        MethodBody {
            arity: 0,
            temps: 0,
            body: Region::new(vec![LStmt::ReturnValue(this(self.layout.current))]),
        }
    }

    fn request_dispose(&self) -> MethodBody {
        let running = LabelId(0);
        let done = LabelId(1);
        let stmts = vec![
            LStmt::goto_if(self.state_cmp(BinaryOp::Ge, ResumeState::RUNNING), running),
            LStmt::goto_if(self.state_cmp(BinaryOp::Eq, ResumeState::FINISHED), done),
            LStmt::assign(
                LPlace::this_field(self.layout.dispose_mode),
                LExpr::bool(true),
            ),
            LStmt::Drive(LExpr::This),
            LStmt::Label(done),
            LStmt::ReturnValue(LExpr::null()),
            LStmt::Label(running),
            LStmt::Fail(RuntimeFault::DisposeWhileRunning),
        ];
        MethodBody {
            arity: 0,
            temps: 0,
            body: Region::new(stmts),
        }
    }

    /// Hand out an enumerator: `self` when idle, a fresh instance otherwise.
    fn get_enumerator(&self) -> MethodBody {
        let instance = TempId(0);
        let reuse = LabelId(0);
        let init = LabelId(1);
        let token = LExpr::Arg(0);

        let mut stmts = vec![
            LStmt::goto_if(self.state_cmp(BinaryOp::Eq, ResumeState::FINISHED), reuse),
            LStmt::assign(LPlace::Temp(instance), LExpr::NewInstance),
            LStmt::Goto(init),
            LStmt::Label(reuse),
            LStmt::assign(LPlace::Temp(instance), LExpr::This),
            LStmt::Label(init),
            LStmt::assign(
                on(instance, self.layout.state),
                LExpr::state(ResumeState::NOT_STARTED),
            ),
            LStmt::assign(on(instance, self.layout.dispose_mode), LExpr::bool(false)),
        ];

        for param in self.params() {
            if Some(param) == self.layout.linked_token {
                continue;
            }
            if let (Some(field), Some(proxy)) = (self.layout.param(param), self.layout.proxy(param))
            {
                stmts.push(LStmt::assign(on(instance, field), this(proxy)));
            }
        }

        if let Some(linked) = self.linked_token_fields() {
            self.link_tokens(instance, linked, token, &mut stmts);
        }
        stmts.push(LStmt::ReturnValue(LExpr::Temp(instance)));

        MethodBody {
            arity: 1,
            temps: 1,
            body: Region::new(stmts),
        }
    }

    fn linked_token_fields(&self) -> Option<LinkedToken> {
        let param = self.layout.linked_token?;
        Some(LinkedToken {
            field: self.layout.param(param)?,
            proxy: self.layout.proxy(param)?,
            combined: self.layout.combined_tokens?,
        })
    }

    /// ```text
    /// if (self.proxy.token == null) goto use_argument
    /// if (arg0 == self.proxy.token) goto use_proxy
    /// if (arg0 == null) goto use_proxy
    /// t0.combined_tokens = link(self.proxy.token, arg0)
    /// t0.param.token = token(t0.combined_tokens)
    /// goto done
    /// ...
    /// ```
    fn link_tokens(
        &self,
        instance: TempId,
        linked: LinkedToken,
        argument: LExpr,
        stmts: &mut Vec<LStmt>,
    ) {
        let use_argument = LabelId(2);
        let use_proxy = LabelId(3);
        let done = LabelId(4);
        let proxy = this(linked.proxy);

        stmts.extend([
            LStmt::goto_if(
                LExpr::binary(BinaryOp::Eq, proxy.clone(), LExpr::null()),
                use_argument,
            ),
            LStmt::goto_if(
                LExpr::binary(BinaryOp::Eq, argument.clone(), proxy.clone()),
                use_proxy,
            ),
            LStmt::goto_if(
                LExpr::binary(BinaryOp::Eq, argument.clone(), LExpr::null()),
                use_proxy,
            ),
            LStmt::assign(
                on(instance, linked.combined),
                LExpr::LinkTokens(Box::new(proxy.clone()), Box::new(argument.clone())),
            ),
            LStmt::assign(
                on(instance, linked.field),
                LExpr::SourceToken(Box::new(read(instance, linked.combined))),
            ),
            LStmt::Goto(done),
            LStmt::Label(use_argument),
            LStmt::assign(on(instance, linked.field), argument),
            LStmt::Goto(done),
            LStmt::Label(use_proxy),
            LStmt::assign(on(instance, linked.field), proxy),
            LStmt::Label(done),
        ]);
    }
}

#[derive(Clone, Copy)]
struct LinkedToken {
    field: FieldId,
    proxy: FieldId,
    combined: FieldId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use turnstile_ir::builder::*;

    use crate::allocator::StateAllocator;
    use crate::analysis::analyze_body;
    use crate::options::LoweringOptions;
    use crate::rewrite::rewrite_body;

    fn build(method: &MethodDecl, options: &LoweringOptions) -> StateMachineType {
        let facts = analyze_body(method).unwrap();
        let layout = FieldLayout::new(method, options, &facts, &BTreeSet::new()).unwrap();
        let body = rewrite_body(method, &layout, StateAllocator::default()).unwrap();
        build_machine(method, options.flavor, layout, body)
    }

    #[test]
    fn test_enumerator_has_no_get_enumerator() {
        let mut builder = MethodBuilder::new("m");
        let n = builder.param("n");
        let method = builder.build(vec![yield_return(param(n))]);
        let machine = build(&method, &LoweringOptions::default());

        assert!(machine.get_enumerator.is_none());
        assert_eq!(machine.kickoff.arity, 1);
        assert_eq!(
            machine.kickoff.body.stmts[1],
            LStmt::assign(on(TempId(0), FieldId(0)), LExpr::int(-3))
        );
    }

    #[test]
    fn test_reiterable_kickoff_fills_proxies() {
        let mut builder = MethodBuilder::new("m");
        let n = builder.param("n");
        let method = builder.build(vec![yield_return(param(n))]);
        let machine = build(&method, &LoweringOptions::reiterable());

        let proxy = machine.field_by_name("proxy.n").unwrap().id;
        assert!(
            machine
                .kickoff
                .body
                .stmts
                .contains(&LStmt::assign(on(TempId(0), proxy), LExpr::Arg(0)))
        );
        assert_eq!(
            machine.kickoff.body.stmts[1],
            LStmt::assign(on(TempId(0), FieldId(0)), LExpr::int(-2))
        );
        let get_enumerator = machine.get_enumerator.unwrap();
        assert_eq!(get_enumerator.arity, 1);
    }

    #[test]
    fn test_request_dispose_guards_running_state() {
        let method = MethodBuilder::new("m").build(vec![yield_return(int(1))]);
        let machine = build(&method, &LoweringOptions::default());
        assert_eq!(
            machine.request_dispose.body.stmts.last(),
            Some(&LStmt::Fail(RuntimeFault::DisposeWhileRunning))
        );
    }
}
