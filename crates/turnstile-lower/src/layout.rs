//! Field layout of the synthesized state-machine type.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use turnstile_ir::{FieldDecl, FieldId, FieldKind, Flavor, LocalId, MethodDecl, ParamId};

use crate::analysis::BodyFacts;
use crate::errors::{LoweringErrorKind, LoweringResult};
use crate::options::LoweringOptions;

#[derive(Debug)]
pub struct FieldLayout {
    fields: Vec<FieldDecl>,
    pub state: FieldId,
    pub current: FieldId,
    pub dispose_mode: FieldId,
    pub awaiter: Option<FieldId>,
    params: Vec<FieldId>,
    proxies: Vec<FieldId>,
    hoisted: BTreeMap<LocalId, FieldId>,
    pub combined_tokens: Option<FieldId>,
    /// The parameter combined with GetEnumerator's token.
    pub linked_token: Option<ParamId>,
}

impl FieldLayout {
    pub fn new(
        method: &MethodDecl,
        options: &LoweringOptions,
        facts: &BodyFacts,
        hoisted: &BTreeSet<LocalId>,
    ) -> LoweringResult<Self> {
        let linked_token = if options.linked_cancellation {
            Some(linked_token_param(method, options)?)
        } else {
            None
        };

        let mut fields = Vec::new();
        let mut names = HashSet::new();
        let mut add = |name: String, kind: FieldKind| {
            let id = FieldId(fields.len() as u32);
            let name = unique_name(&mut names, name);
            fields.push(FieldDecl { id, name, kind });
            id
        };

        let state = add("state".to_string(), FieldKind::State);
        let current = add("current".to_string(), FieldKind::Current);
        let dispose_mode = add("dispose_mode".to_string(), FieldKind::DisposeMode);
        let awaiter = facts
            .has_await()
            .then(|| add("awaiter".to_string(), FieldKind::Awaiter));

        let params = method
            .params
            .iter()
            .enumerate()
            .map(|(index, decl)| {
                let param = ParamId(index as u32);
                add(format!("param.{}", decl.name), FieldKind::Parameter(param))
            })
            .collect();

        let proxies = match options.flavor {
            Flavor::Enumerator => Vec::new(),
            Flavor::Reiterable => method
                .params
                .iter()
                .enumerate()
                .map(|(index, decl)| {
                    let param = ParamId(index as u32);
                    add(format!("proxy.{}", decl.name), FieldKind::ParameterProxy(param))
                })
                .collect(),
        };

        let hoisted = hoisted
            .iter()
            .map(|&local| -> LoweringResult<(LocalId, FieldId)> {
                let name = method
                    .local(local)
                    .map(|decl| decl.name.clone())
                    .ok_or(LoweringErrorKind::UnknownLocal(local))?;
                Ok((local, add(format!("hoisted.{name}"), FieldKind::HoistedLocal(local))))
            })
            .collect::<LoweringResult<BTreeMap<_, _>>>()?;

        let combined_tokens = linked_token
            .map(|_| add("combined_tokens".to_string(), FieldKind::CombinedTokens));

        Ok(FieldLayout {
            fields,
            state,
            current,
            dispose_mode,
            awaiter,
            params,
            proxies,
            hoisted,
            combined_tokens,
            linked_token,
        })
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<FieldDecl> {
        self.fields
    }

    pub fn param(&self, param: ParamId) -> Option<FieldId> {
        self.params.get(param.0 as usize).copied()
    }

    /// Proxy field of `param`; only the re-iterable flavor has them.
    pub fn proxy(&self, param: ParamId) -> Option<FieldId> {
        self.proxies.get(param.0 as usize).copied()
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn hoisted(&self, local: LocalId) -> Option<FieldId> {
        self.hoisted.get(&local).copied()
    }

    pub fn hoisted_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.hoisted.values().copied()
    }
}

fn linked_token_param(method: &MethodDecl, options: &LoweringOptions) -> LoweringResult<ParamId> {
    if options.flavor != Flavor::Reiterable {
        return Err(LoweringErrorKind::LinkedCancellationWithoutEnumerable.into());
    }
    let tokens: Vec<_> = method
        .params
        .iter()
        .enumerate()
        .filter(|(_, decl)| decl.cancellation_token)
        .map(|(index, _)| ParamId(index as u32))
        .collect();
    match tokens.as_slice() {
        [token] => Ok(*token),
        _ => Err(LoweringErrorKind::CancellationTokenParameter(tokens.len()).into()),
    }
}

fn unique_name(taken: &mut HashSet<String>, name: String) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{name}.{suffix}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_ir::builder::*;

    fn names(layout: &FieldLayout) -> Vec<&str> {
        layout.fields().iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_enumerator_layout() {
        let mut builder = MethodBuilder::new("m");
        let n = builder.param("n");
        let items = builder.local("items");
        let method = builder.build(vec![yield_return(param(n))]);
        let layout = FieldLayout::new(
            &method,
            &LoweringOptions::default(),
            &BodyFacts { yields: 1, awaits: 0 },
            &BTreeSet::from([items]),
        )
        .unwrap();

        assert_eq!(
            names(&layout),
            vec!["state", "current", "dispose_mode", "param.n", "hoisted.items"]
        );
        assert_eq!(layout.awaiter, None);
        assert_eq!(layout.proxy(n), None);
        assert_eq!(layout.param(n), Some(FieldId(3)));
        assert_eq!(layout.hoisted(items), Some(FieldId(4)));
    }

    #[test]
    fn test_reiterable_layout_with_linked_tokens() {
        let mut builder = MethodBuilder::new("m");
        let n = builder.param("n");
        let token = builder.token_param("token");
        let method = builder.build(vec![yield_return(param(n)), expr(param(token))]);
        let options = LoweringOptions {
            linked_cancellation: true,
            ..LoweringOptions::reiterable()
        };
        let layout = FieldLayout::new(
            &method,
            &options,
            &BodyFacts { yields: 1, awaits: 1 },
            &BTreeSet::new(),
        )
        .unwrap();

        assert_eq!(
            names(&layout),
            vec![
                "state",
                "current",
                "dispose_mode",
                "awaiter",
                "param.n",
                "param.token",
                "proxy.n",
                "proxy.token",
                "combined_tokens",
            ]
        );
        assert_eq!(layout.linked_token, Some(token));
        assert_eq!(layout.proxy(token), Some(FieldId(7)));
    }

    #[test]
    fn test_linked_cancellation_needs_reiterable() {
        let mut builder = MethodBuilder::new("m");
        builder.token_param("token");
        let method = builder.build(vec![yield_break()]);
        let options = LoweringOptions {
            linked_cancellation: true,
            ..Default::default()
        };
        let err = FieldLayout::new(&method, &options, &BodyFacts::default(), &BTreeSet::new())
            .unwrap_err();
        assert_eq!(err.kind(), &LoweringErrorKind::LinkedCancellationWithoutEnumerable);
    }

    #[test]
    fn test_linked_cancellation_needs_one_token() {
        let mut builder = MethodBuilder::new("m");
        builder.param("n");
        let method = builder.build(vec![yield_break()]);
        let options = LoweringOptions {
            linked_cancellation: true,
            ..LoweringOptions::reiterable()
        };
        let err = FieldLayout::new(&method, &options, &BodyFacts::default(), &BTreeSet::new())
            .unwrap_err();
        assert_eq!(err.kind(), &LoweringErrorKind::CancellationTokenParameter(0));
    }

    #[test]
    fn test_colliding_local_names_are_suffixed() {
        let mut builder = MethodBuilder::new("m");
        let a = builder.local("x");
        let b = builder.local("x");
        let method = builder.build(vec![yield_break()]);
        let layout = FieldLayout::new(
            &method,
            &LoweringOptions::default(),
            &BodyFacts::default(),
            &BTreeSet::from([a, b]),
        )
        .unwrap();
        assert_eq!(
            names(&layout)[3..],
            ["hoisted.x", "hoisted.x.1"]
        );
    }
}
