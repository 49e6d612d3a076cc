//! End-to-end lowering of small generators, checked against their printed form.

use insta::assert_snapshot;
use turnstile_core::Span;
use turnstile_ir::builder::*;
use turnstile_ir::{ResumeState, Stmt, StmtKind};
use turnstile_lower::{AllocatorSeed, LoweringErrorKind, LoweringOptions, lower_method};

#[test]
fn test_lower_two_yields() {
    let method = MethodBuilder::new("numbers").build(vec![yield_return(int(1)), yield_return(int(2))]);
    let machine = lower_method(&method, &LoweringOptions::default()).unwrap();

    assert_snapshot!(machine.to_string(), @r"
    machine numbers (enumerator)
    fields:
      #0 state
      #1 current
      #2 dispose_mode
    states:
      -5 yield @ 2..3
      -4 yield @ 1..2
    kickoff(0):
      t0 = new
      t0.state = -3
      return t0
    advance(0):
      if (self.state == -2) goto L0
      try {
        switch self.state { -4 => L1, -5 => L2 }
        if self.dispose_mode goto L0
        self.state = -1
        self.current = 1
        self.state = -4
        return produced
      L1:
        self.state = -1
        if self.dispose_mode goto L0
        self.current = 2
        self.state = -5
        return produced
      L2:
        self.state = -1
        if self.dispose_mode goto L0
        self.dispose_mode = true
        goto L0
      } catch t0 {
        self.state = -2
        self.current = null
        throw t0
      }
    L0:
      self.state = -2
      self.current = null
      return finished
    current(0):
      return self.current
    request_dispose(0):
      if (self.state >= -1) goto L0
      if (self.state == -2) goto L1
      self.dispose_mode = true
      drive self
    L1:
      return null
    L0:
      fail DisposeWhileRunning
    ");
}

#[test]
fn test_lower_reiterable_with_linked_cancellation() {
    let mut builder = MethodBuilder::new("ticks");
    let n = builder.param("n");
    builder.token_param("token");
    let method = builder.build(vec![yield_return(param(n))]);
    let options = LoweringOptions {
        linked_cancellation: true,
        ..LoweringOptions::reiterable()
    };
    let machine = lower_method(&method, &options).unwrap();

    assert_snapshot!(machine.to_string(), @r"
    machine ticks (reiterable)
    fields:
      #0 state
      #1 current
      #2 dispose_mode
      #3 param.n
      #4 param.token
      #5 proxy.n
      #6 proxy.token
      #7 combined_tokens
    states:
      -4 yield @ 1..2
    kickoff(2):
      t0 = new
      t0.state = -2
      t0.proxy.n = arg0
      t0.proxy.token = arg1
      return t0
    advance(0):
      if (self.state == -2) goto L0
      try {
        switch self.state { -4 => L1 }
        if self.dispose_mode goto L0
        self.state = -1
        self.current = self.param.n
        self.state = -4
        return produced
      L1:
        self.state = -1
        if self.dispose_mode goto L0
        self.dispose_mode = true
        goto L0
      } catch t0 {
        self.state = -2
        self.current = null
        dispose(self.combined_tokens)
        self.combined_tokens = null
        throw t0
      }
    L0:
      self.state = -2
      self.current = null
      dispose(self.combined_tokens)
      self.combined_tokens = null
      return finished
    current(0):
      return self.current
    request_dispose(0):
      if (self.state >= -1) goto L0
      if (self.state == -2) goto L1
      self.dispose_mode = true
      drive self
    L1:
      return null
    L0:
      fail DisposeWhileRunning
    get_enumerator(1):
      if (self.state == -2) goto L0
      t0 = new
      goto L1
    L0:
      t0 = self
    L1:
      t0.state = -3
      t0.dispose_mode = false
      t0.param.n = self.proxy.n
      if (self.proxy.token == null) goto L2
      if (arg0 == self.proxy.token) goto L3
      if (arg0 == null) goto L3
      t0.combined_tokens = link(self.proxy.token, arg0)
      t0.param.token = token(t0.combined_tokens)
      goto L4
    L2:
      t0.param.token = arg0
      goto L4
    L3:
      t0.param.token = self.proxy.token
    L4:
      return t0
    ");
}

#[test]
fn test_yield_inside_catch_is_rejected() {
    let method = MethodBuilder::new("bad").build(vec![try_catch(
        vec![throw(str_("boom"))],
        None,
        vec![yield_return(int(1))],
    )]);
    let err = lower_method(&method, &LoweringOptions::default()).unwrap_err();
    assert!(matches!(err.kind(), LoweringErrorKind::YieldInCatch(_)));
    assert!(err.to_string().starts_with("yield inside a catch clause"));
}

fn yield_at(value: i64, start: usize) -> Stmt {
    Stmt::new(StmtKind::YieldReturn(int(value)), Span::new(start, start + 10))
}

#[test]
fn test_recompilation_keeps_surviving_states() {
    let before = MethodBuilder::new("edited").build(vec![yield_at(1, 100), yield_at(2, 200)]);
    let first = lower_method(&before, &LoweringOptions::default()).unwrap();
    assert_eq!(first.states.len(), 2);

    // The first yield was replaced by a new one at a different location.
    let after = MethodBuilder::new("edited").build(vec![yield_at(3, 50), yield_at(2, 200)]);
    let options = LoweringOptions {
        allocator_seed: Some(AllocatorSeed::from_debug_map(&first.states)),
        ..Default::default()
    };
    let second = lower_method(&after, &options).unwrap();

    let locations: Vec<_> = second
        .states
        .iter()
        .map(|(state, entry)| (state, entry.span.start))
        .collect();
    assert_eq!(
        locations,
        vec![(ResumeState(-6), 50), (ResumeState(-5), 200)]
    );
    assert!(second.to_string().contains("-4 => L3"));
}
