//! Árbol de fragments de un step.
//!
//! La raíz es el propio step (su `FragmentTree` vive en el slot del proceso);
//! cada hijo es un `FragmentNode` colgado de un parámetro `key_list` de su
//! padre. Las operaciones son genéricas sobre `F: Fragment + ?Sized` para que
//! la raíz (`dyn Step`) y los nodos (`dyn Fragment`) compartan recorrido.

use log::debug;
use serde_json::Value;

use super::{Fragment, FragmentContext, FragmentLayout, FragmentState, StepEnv, ValidationErrors};
use crate::errors::{ProcessError, StepError};
use crate::param::{KeyFlags, ParamId, ParameterStore};

#[derive(Debug, Default)]
pub(crate) struct FragmentTree {
    pub(crate) layout: FragmentLayout,
    pub(crate) children: Vec<FragmentNode>,
    pub(crate) state: FragmentState,
}

pub(crate) struct FragmentNode {
    pub(crate) name: String,
    pub(crate) parent_param: ParamId,
    /// Nombres desde la raíz del step hasta este nodo (incluido).
    pub(crate) path: Vec<String>,
    pub(crate) fragment: Box<dyn Fragment>,
    pub(crate) tree: FragmentTree,
}

impl std::fmt::Debug for FragmentNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentNode")
         .field("name", &self.name)
         .field("parent_param", &self.parent_param)
         .field("tree", &self.tree)
         .finish()
    }
}

/// Parámetro de interacción visible para la capa de UI.
#[derive(Debug, Clone)]
pub(crate) struct CollectedParam {
    pub(crate) id: ParamId,
    pub(crate) fragment: String,
    pub(crate) writable: bool,
}

pub(crate) fn init<F: Fragment + ?Sized>(fragment: &mut F,
                                         name: &str,
                                         path: &[String],
                                         tree: &mut FragmentTree,
                                         env: &mut StepEnv<'_>)
                                         -> Result<(), ProcessError> {
    let step = env.step;
    tree.state = FragmentState::Setup;
    {
        let mut ctx = env.context(name, &mut tree.layout);
        fragment.setup(&mut ctx).map_err(|e| ProcessError::from_step(step, e))?;
    }
    {
        let mut ctx = env.context(name, &mut tree.layout);
        fragment.init(&mut ctx).map_err(|e| ProcessError::from_step(step, e))?;
    }
    tree.state = FragmentState::Initialized;
    settle(path, tree, env)?;
    tree.state = FragmentState::Active;
    debug!("fragment:init step={} fragment={} params={}", step, name, tree.layout.interaction.len());
    Ok(())
}

pub(crate) fn prepare_interaction<F: Fragment + ?Sized>(fragment: &mut F,
                                                        name: &str,
                                                        path: &[String],
                                                        tree: &mut FragmentTree,
                                                        env: &mut StepEnv<'_>)
                                                        -> Result<(), ProcessError> {
    let step = env.step;
    {
        let mut ctx = env.context(name, &mut tree.layout);
        fragment.prepare_interaction(&mut ctx).map_err(|e| ProcessError::from_step(step, e))?;
    }
    settle(path, tree, env)?;
    for child in tree.children.iter_mut() {
        prepare_interaction(&mut *child.fragment, &child.name, &child.path, &mut child.tree, env)?;
        publish(child, env);
    }
    Ok(())
}

/// Entrega la interacción sobre `key` al fragment que la declaró. Devuelve
/// `false` si ningún nodo la reconoce.
pub(crate) fn dispatch<F: Fragment + ?Sized>(fragment: &mut F,
                                             name: &str,
                                             path: &[String],
                                             tree: &mut FragmentTree,
                                             key: &ParamId,
                                             env: &mut StepEnv<'_>)
                                             -> Result<bool, ProcessError> {
    for child in tree.children.iter_mut() {
        if dispatch(&mut *child.fragment, &child.name, &child.path, &mut child.tree, key, env)? {
            publish(child, env);
            return Ok(true);
        }
    }
    let owns = tree.layout.interaction.contains(key) && !tree.children.iter().any(|c| &c.parent_param == key);
    if !owns {
        return Ok(false);
    }
    let step = env.step;
    {
        let mut ctx = env.context(name, &mut tree.layout);
        fragment.handle_interaction(key, &mut ctx).map_err(|e| ProcessError::from_step(step, e))?;
    }
    settle(path, tree, env)?;
    Ok(true)
}

pub(crate) fn finish<F: Fragment + ?Sized>(fragment: &mut F,
                                           name: &str,
                                           tree: &mut FragmentTree,
                                           env: &mut StepEnv<'_>)
                                           -> Result<(), ProcessError> {
    let step = env.step;
    while let Some(mut child) = tree.children.pop() {
        finish(&mut *child.fragment, &child.name, &mut child.tree, env)?;
    }
    {
        let mut ctx = env.context(name, &mut tree.layout);
        fragment.finish(&mut ctx).map_err(|e| ProcessError::from_step(step, e))?;
    }
    remove_temporaries(&tree.layout, env);
    tree.state = FragmentState::Finished;
    Ok(())
}

/// Aborta el subárbol. No falla: los errores de limpieza no deben ocultar la
/// causa que provocó el abort.
pub(crate) fn abort<F: Fragment + ?Sized>(fragment: &mut F, name: &str, tree: &mut FragmentTree, env: &mut StepEnv<'_>) {
    while let Some(mut child) = tree.children.pop() {
        abort(&mut *child.fragment, &child.name, &mut child.tree, env);
    }
    {
        let mut ctx = env.context(name, &mut tree.layout);
        fragment.abort(&mut ctx);
    }
    remove_temporaries(&tree.layout, env);
    tree.state = FragmentState::Aborted;
}

pub(crate) fn validate(tree: &FragmentTree, store: &ParameterStore, on_interaction: bool, errors: &mut ValidationErrors) {
    tree.layout.validate(store, on_interaction, errors);
    for child in &tree.children {
        validate(&child.tree, store, on_interaction, errors);
    }
}

pub(crate) fn collect(name: &str, tree: &FragmentTree, out: &mut Vec<CollectedParam>) {
    for id in &tree.layout.interaction {
        out.push(CollectedParam { id: id.clone(),
                                  fragment: name.to_string(),
                                  writable: tree.layout.is_input(id) });
    }
    for child in &tree.children {
        collect(&child.name, &child.tree, out);
    }
}

pub(crate) fn is_writable(tree: &FragmentTree, id: &ParamId) -> bool {
    tree.layout.is_input(id) || tree.children.iter().any(|c| is_writable(&c.tree, id))
}

pub(crate) fn is_continuation(tree: &FragmentTree, id: &ParamId) -> bool {
    tree.layout.is_continuation(id) || tree.children.iter().any(|c| is_continuation(&c.tree, id))
}

/// Invoca un hook sobre el nodo con su contexto y procesa después las colas
/// de attach/detach que haya dejado.
pub(crate) fn invoke<F, R>(fragment: &mut F,
                           name: &str,
                           path: &[String],
                           tree: &mut FragmentTree,
                           env: &mut StepEnv<'_>,
                           hook: impl FnOnce(&mut F, &mut FragmentContext<'_>) -> Result<R, StepError>)
                           -> Result<R, ProcessError>
    where F: Fragment + ?Sized
{
    let step = env.step;
    let out = {
        let mut ctx = env.context(name, &mut tree.layout);
        hook(fragment, &mut ctx).map_err(|e| ProcessError::from_step(step, e))?
    };
    settle(path, tree, env)?;
    Ok(out)
}

/// Procesa las colas de attach/detach que dejó el último callback del nodo.
fn settle(path: &[String], tree: &mut FragmentTree, env: &mut StepEnv<'_>) -> Result<(), ProcessError> {
    for parent in std::mem::take(&mut tree.layout.detach_queue) {
        if let Some(pos) = tree.children.iter().position(|c| c.parent_param == parent) {
            let mut node = tree.children.remove(pos);
            finish(&mut *node.fragment, &node.name, &mut node.tree, env)?;
        }
        env.store.remove(&parent);
        tree.layout.remove_interaction(&parent);
    }
    for (parent, fragment) in std::mem::take(&mut tree.layout.attach_queue) {
        let name = fragment.name().to_string();
        if path.iter().any(|p| *p == name) {
            return Err(ProcessError::CyclicFragment { step: env.step.to_string(), fragment: name });
        }
        if let Some(pos) = tree.children.iter().position(|c| c.parent_param == parent) {
            let mut old = tree.children.remove(pos);
            finish(&mut *old.fragment, &old.name, &mut old.tree, env)?;
        }
        let mut node_path = path.to_vec();
        node_path.push(name.clone());
        let mut node = FragmentNode { name,
                                      parent_param: parent.clone(),
                                      path: node_path,
                                      fragment,
                                      tree: FragmentTree::default() };
        init(&mut *node.fragment, &node.name, &node.path, &mut node.tree, env)?;
        publish(&node, env);
        tree.layout.add_interaction(parent);
        tree.children.push(node);
    }
    Ok(())
}

/// El valor del parámetro padre es la lista de parámetros del hijo.
fn publish(node: &FragmentNode, env: &mut StepEnv<'_>) {
    let list = Value::Array(node.tree
                                .layout
                                .interaction
                                .iter()
                                .map(|id| Value::String(id.to_string()))
                                .collect());
    if env.store.value(&node.parent_param) != Some(&list) {
        env.store.set_value(node.parent_param.clone(), list, KeyFlags { key_list: true, ..KeyFlags::NONE });
    }
}

fn remove_temporaries(layout: &FragmentLayout, env: &mut StepEnv<'_>) {
    for id in &layout.temporary {
        env.store.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;
    use crate::param::{ParamKey, ParamList};
    use crate::process::CancellationFlag;
    use crate::step::StepRuntime;
    use uuid::Uuid;

    const CHILD: ParamKey<ParamList> = ParamKey::key_list("child");
    const FIELD: ParamKey<String> = ParamKey::new("field");

    struct Leaf;

    impl Fragment for Leaf {
        fn name(&self) -> &str {
            "leaf"
        }

        fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
            ctx.add_input(&FIELD);
            let scratch: ParamKey<u32> = ctx.temporary("scratch");
            ctx.set(&scratch, 1)
        }
    }

    /// Se adjunta a sí mismo: debe rechazarse.
    struct Recursive;

    impl Fragment for Recursive {
        fn name(&self) -> &str {
            "recursive"
        }

        fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
            ctx.attach(&CHILD, Recursive);
            Ok(())
        }
    }

    struct Root<F: Fn() -> Box<dyn Fragment> + Send>(F);

    impl<F: Fn() -> Box<dyn Fragment> + Send> Fragment for Root<F> {
        fn name(&self) -> &str {
            "root"
        }

        fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
            ctx.layout.attach_queue.push((CHILD.id().clone(), (self.0)()));
            Ok(())
        }
    }

    fn with_env<R>(f: impl FnOnce(&mut StepEnv<'_>) -> R) -> (R, ParameterStore) {
        let ctx = EngineContext::default();
        let cancel = CancellationFlag::default();
        let mut store = ParameterStore::new();
        let mut runtime = StepRuntime::default();
        let result = {
            let mut env = StepEnv { process_id: Uuid::new_v4(),
                                    step: "s",
                                    store: &mut store,
                                    runtime: &mut runtime,
                                    env: &ctx,
                                    cancel: &cancel };
            f(&mut env)
        };
        (result, store)
    }

    #[test]
    fn child_parameters_are_published_under_parent_key() {
        let mut root = Root(|| Box::new(Leaf) as Box<dyn Fragment>);
        let mut tree = FragmentTree::default();
        let (result, store) = with_env(|env| init(&mut root, "root", &["root".to_string()], &mut tree, env));
        result.unwrap();
        assert_eq!(tree.state, FragmentState::Active);
        assert_eq!(tree.layout.interaction_params(), &[CHILD.id().clone()]);
        assert_eq!(store.get(&CHILD).unwrap(), Some(vec![FIELD.id().clone()]));
        assert!(is_writable(&tree, FIELD.id()));
        assert!(!is_writable(&tree, CHILD.id()));
    }

    #[test]
    fn temporaries_are_removed_on_finish() {
        let mut root = Root(|| Box::new(Leaf) as Box<dyn Fragment>);
        let mut tree = FragmentTree::default();
        let (_, store) = with_env(|env| {
            init(&mut root, "root", &["root".to_string()], &mut tree, env).unwrap();
            assert!(env.store.contains(&ParamId::new("leaf.scratch")));
            finish(&mut root, "root", &mut tree, env).unwrap();
        });
        assert!(!store.contains(&ParamId::new("leaf.scratch")));
        assert_eq!(tree.state, FragmentState::Finished);
        assert!(tree.children.is_empty());
    }

    #[test]
    fn cyclic_attachment_is_rejected() {
        let mut root = Root(|| Box::new(Recursive) as Box<dyn Fragment>);
        let mut tree = FragmentTree::default();
        let (result, _) = with_env(|env| init(&mut root, "root", &["root".to_string()], &mut tree, env));
        assert!(matches!(result, Err(ProcessError::CyclicFragment { ref fragment, .. }) if fragment == "recursive"));
    }
}
