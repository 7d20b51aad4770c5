use avian_islands::prelude::*;
use bevy::prelude::*;

use super::{StepCounter, add_body, create_app};

/// Chains of bodies hanging from the static world, connected by joints.
#[derive(Resource)]
struct Chains {
    /// The joints of each chain, starting from the static anchor.
    joints: Vec<Vec<EdgeHandle>>,
    /// The joint of each chain that is currently broken.
    broken: Vec<Option<usize>>,
}

pub fn create_bench(chain_count: usize, chain_length: usize) -> App {
    let mut app = create_app(|manager, app| {
        let chains = setup(manager, chain_count, chain_length.max(2));
        app.insert_resource(chains);
    });
    app.add_systems(Update, break_links.before(IslandSystems::FirstPass));
    app
}

fn setup(manager: &mut IslandManager, chain_count: usize, chain_length: usize) -> Chains {
    manager
        .pre_allocate(chain_count * chain_length)
        .expect("the chains should fit in memory");

    let mut body_index = 0;
    let mut joint_index = 0;

    let joints: Vec<Vec<EdgeHandle>> = (0..chain_count)
        .map(|_| {
            let mut previous = None;
            (0..chain_length)
                .map(|_| {
                    let node = add_body(manager, body_index);
                    body_index += 1;

                    let joint = manager
                        .add_edge(EdgeKind::Constraint, previous, Some(node))
                        .expect("links should be valid during setup");
                    manager
                        .set_edge_constraint(joint, Entity::from_raw(1_000_000 + joint_index))
                        .expect("edge should be a constraint edge");
                    manager
                        .set_edge_connected(joint)
                        .expect("joint should be valid during setup");
                    joint_index += 1;

                    previous = Some(node);
                    joint
                })
                .collect()
        })
        .collect();

    Chains {
        joints,
        broken: vec![None; chain_count],
    }
}

/// Breaks one joint in every chain and repairs the joint that was broken in the previous step.
fn break_links(mut manager: ResMut<IslandManager>, mut chains: ResMut<Chains>, step: Res<StepCounter>) {
    let Chains { joints, broken } = &mut *chains;

    for (i, (chain, broken)) in joints.iter().zip(broken.iter_mut()).enumerate() {
        // The anchor joint is never broken.
        let next = 1 + (step.0 as usize + i) % (chain.len() - 1);

        if let Some(previous) = broken.replace(next) {
            manager
                .set_edge_connected(chain[previous])
                .expect("joints should outlive the benchmark");
        }

        manager
            .set_edge_unconnected(chain[next])
            .expect("joints should outlive the benchmark");
    }
}
