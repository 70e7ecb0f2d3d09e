use std::collections::BTreeSet;

use crate::model::{Identity, Namespace};

/// Whether `identity` may read shortcuts in `namespace`.
pub fn can_read(identity: &Identity, namespace: &Namespace, public: &BTreeSet<Namespace>) -> bool {
    if namespace.is_global() || public.contains(namespace) {
        return true;
    }
    match identity {
        Identity::Anonymous => false,
        Identity::User {
            user_id,
            organizations,
            ..
        } => {
            *namespace == Namespace::personal(user_id)
                || organizations.iter().any(|o| *namespace == Namespace::org(o))
        }
    }
}

/// Ordered, deduplicated namespaces to probe, most specific first:
/// authorized hint, personal, organizations in membership order, global.
pub fn scope_order(
    identity: &Identity,
    hint: Option<&Namespace>,
    public: &BTreeSet<Namespace>,
) -> Vec<Namespace> {
    let mut order: Vec<Namespace> = Vec::with_capacity(4);
    let mut push = |ns: Namespace| {
        if !order.contains(&ns) {
            order.push(ns);
        }
    };

    if let Some(h) = hint {
        if can_read(identity, h, public) {
            push(h.clone());
        } else {
            tracing::debug!(namespace = %h, "namespace hint not readable; ignored");
        }
    }

    if let Identity::User {
        user_id,
        organizations,
        ..
    } = identity
    {
        push(Namespace::personal(user_id));
        for org in organizations {
            push(Namespace::org(org));
        }
    }

    push(Namespace::global());
    order
}
