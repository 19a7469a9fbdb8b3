use kapply_inventory::ResourceReference;

pub fn is_type_defining(reference: &ResourceReference) -> bool {
    reference.group == "apiextensions.k8s.io" && reference.kind == "CustomResourceDefinition"
}

pub fn is_namespace(reference: &ResourceReference) -> bool {
    reference.group.is_empty() && reference.kind == "Namespace"
}

/// Objects other objects may depend on
fn is_foundation(reference: &ResourceReference) -> bool {
    is_namespace(reference) || is_type_defining(reference)
}

pub fn retain_split<T>(i: Vec<T>, pred: impl Fn(&T) -> bool) -> (Vec<T>, Vec<T>) {
    let mut a = Vec::new();
    let mut b = Vec::new();

    for v in i.into_iter() {
        if pred(&v) {
            a.push(v)
        } else {
            b.push(v);
        }
    }

    (a, b)
}

/// Group objects into sequential waves, objects inside single wave are independent.
///
/// Namespaces and CRDs can't depend on anything else, so it is safe to apply them first.
/// This doesn't guarantee a CRD is served once applied, callers still need to retry.
pub fn apply_waves<T>(items: Vec<T>, reference: impl Fn(&T) -> &ResourceReference) -> Vec<Vec<T>> {
    let (foundation, rest) = retain_split(items, |item| is_foundation(reference(item)));
    [foundation, rest]
        .into_iter()
        .filter(|wave| !wave.is_empty())
        .collect()
}

/// Reverse of [`apply_waves`], instances are removed before their definitions
pub fn delete_waves<T>(items: Vec<T>, reference: impl Fn(&T) -> &ResourceReference) -> Vec<Vec<T>> {
    let mut waves = apply_waves(items, reference);
    waves.reverse();
    for wave in waves.iter_mut() {
        wave.reverse();
    }
    waves
}
