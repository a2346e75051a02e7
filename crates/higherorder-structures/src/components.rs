//! Connected components ("blobs") of a filtered entity set.
//!
//! Uses an explicit-stack variant of Tarjan's strongly connected components
//! algorithm. Adjacency is symmetric, so every strongly connected component
//! is also a connected component. The explicit stack means arbitrarily large
//! structures never hit a recursion limit.
//!
//! Only edges between entities present in the input state are followed; the
//! lookup table is restricted here, so callers may pass the full table.
//! Component order and member order depend only on the input maps, which are
//! ordered, so results are deterministic.

use std::collections::{BTreeMap, BTreeSet};

use crate::{Entity, Lut, StateMap};

/// Pending work for the iterative depth-first search.
struct Frame<E> {
    node: E,
    parent: Option<E>,
    next_neighbour: usize,
}

/// Restrict a lookup table to the entities present in `state`.
pub fn restrict_lut<E: Entity>(state: &StateMap<E>, lut: &Lut<E>) -> BTreeMap<E, Vec<E>> {
    state
        .keys()
        .map(|entity| {
            let neighbours = lut
                .get(entity)
                .map(|set| set.iter().filter(|n| state.contains_key(n)).cloned().collect())
                .unwrap_or_default();
            (entity.clone(), neighbours)
        })
        .collect()
}

/// Find the connected components of the entities in `state`.
///
/// Every entity of `state` appears in exactly one component.
pub fn blobs<E: Entity>(state: &StateMap<E>, lut: &Lut<E>) -> Vec<Vec<E>> {
    let adjacency = restrict_lut(state, lut);

    let mut counter: usize = 0;
    let mut index: BTreeMap<E, usize> = BTreeMap::new();
    let mut low_link: BTreeMap<E, usize> = BTreeMap::new();
    let mut stack: Vec<E> = Vec::new();
    let mut on_stack: BTreeSet<E> = BTreeSet::new();
    let mut components: Vec<Vec<E>> = Vec::new();
    let mut to_visit: Vec<Frame<E>> = Vec::new();

    for root in state.keys() {
        if index.contains_key(root) {
            continue;
        }
        to_visit.push(Frame {
            node: root.clone(),
            parent: None,
            next_neighbour: 0,
        });

        while let Some(Frame {
            node,
            parent,
            mut next_neighbour,
        }) = to_visit.pop()
        {
            if !index.contains_key(&node) {
                index.insert(node.clone(), counter);
                low_link.insert(node.clone(), counter);
                counter = counter.saturating_add(1);
                stack.push(node.clone());
                on_stack.insert(node.clone());
            }

            let neighbours = adjacency.get(&node).map_or(&[][..], Vec::as_slice);
            let mut descended = false;
            while let Some(neighbour) = neighbours.get(next_neighbour) {
                next_neighbour = next_neighbour.saturating_add(1);
                match index.get(neighbour) {
                    None => {
                        // Resume this node after the child is finished.
                        to_visit.push(Frame {
                            node: node.clone(),
                            parent: parent.clone(),
                            next_neighbour,
                        });
                        to_visit.push(Frame {
                            node: neighbour.clone(),
                            parent: Some(node.clone()),
                            next_neighbour: 0,
                        });
                        descended = true;
                        break;
                    }
                    Some(&neighbour_index) if on_stack.contains(neighbour) => {
                        lower_link(&mut low_link, &node, neighbour_index);
                    }
                    Some(_) => {}
                }
            }
            if descended {
                continue;
            }

            let Some(&node_low) = low_link.get(&node) else {
                continue;
            };
            if let Some(parent) = &parent {
                lower_link(&mut low_link, parent, node_low);
            }

            if index.get(&node) == Some(&node_low) {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.remove(&member);
                    let is_root = member == node;
                    component.push(member);
                    if is_root {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}

fn lower_link<E: Entity>(low_link: &mut BTreeMap<E, usize>, node: &E, candidate: usize) {
    if let Some(current) = low_link.get_mut(node) {
        *current = (*current).min(candidate);
    }
}
