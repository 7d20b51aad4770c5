use crate::prelude::*;
use bevy::prelude::*;

fn body(index: u32) -> Entity {
    Entity::from_raw(index)
}

/// Runs a complete update without a narrow phase in between the passes.
fn update(manager: &mut IslandManager) {
    manager.update_islands().unwrap();
    manager.update_islands_second_pass().unwrap();
    manager.free_buffers();
}

fn add_bodies(manager: &mut IslandManager, count: u32, ready_for_sleeping: bool) -> Vec<NodeHandle> {
    (0..count)
        .map(|i| {
            manager
                .add_node(body(i), BodyKind::Dynamic, ready_for_sleeping)
                .unwrap()
        })
        .collect()
}

fn connect(
    manager: &mut IslandManager,
    kind: EdgeKind,
    node1: Option<NodeHandle>,
    node2: Option<NodeHandle>,
) -> EdgeHandle {
    let edge = manager.add_edge(kind, node1, node2).unwrap();
    manager.set_edge_connected(edge).unwrap();
    edge
}

fn island_of(manager: &IslandManager, node: NodeHandle) -> IslandId {
    manager
        .node_island(node)
        .unwrap()
        .expect("node should be in an island")
}

#[test]
fn created_nodes_get_their_own_islands() {
    let mut manager = IslandManager::default();
    let nodes = add_bodies(&mut manager, 3, false);

    // Nothing happens before the update.
    assert_eq!(manager.island_count(), 0);
    assert_eq!(manager.node_island(nodes[0]).unwrap(), None);

    update(&mut manager);

    assert_eq!(manager.island_count(), 3);
    assert_ne!(island_of(&manager, nodes[0]), island_of(&manager, nodes[1]));
    assert_eq!(manager.output().solver_island_count(), 3);
    manager.validate();
}

#[test]
fn connected_edge_merges_islands() {
    let mut manager = IslandManager::default();
    let nodes = add_bodies(&mut manager, 2, false);
    update(&mut manager);
    assert_eq!(manager.island_count(), 2);

    let edge = connect(
        &mut manager,
        EdgeKind::Constraint,
        Some(nodes[0]),
        Some(nodes[1]),
    );
    update(&mut manager);

    assert_eq!(manager.island_count(), 1);
    let island = island_of(&manager, nodes[0]);
    assert_eq!(island_of(&manager, nodes[1]), island);
    assert_eq!(manager.edge_island(edge).unwrap(), Some(island));
    assert_eq!(manager.island(island).unwrap().node_count(), 2);
    assert_eq!(manager.island(island).unwrap().edge_count(), 1);
}

#[test]
fn broken_edges_split_islands() {
    let mut manager = IslandManager::default();
    let [a, b, c]: [NodeHandle; 3] =
        add_bodies(&mut manager, 3, false).try_into().unwrap();

    let ab = connect(&mut manager, EdgeKind::Constraint, Some(a), Some(b));
    let bc = connect(&mut manager, EdgeKind::Constraint, Some(b), Some(c));
    update(&mut manager);
    assert_eq!(manager.island_count(), 1);

    manager.set_edge_unconnected(ab).unwrap();
    manager.set_edge_unconnected(bc).unwrap();
    update(&mut manager);

    assert_eq!(manager.island_count(), 3);
    assert_eq!(manager.edge_island(ab).unwrap(), None);
    assert_eq!(manager.edge_island(bc).unwrap(), None);
    manager.validate();
}

#[test]
fn split_keeps_nodes_connected_through_other_edges() {
    let mut manager = IslandManager::default();
    let [a, b, c]: [NodeHandle; 3] =
        add_bodies(&mut manager, 3, false).try_into().unwrap();

    let ab = connect(&mut manager, EdgeKind::Constraint, Some(a), Some(b));
    let bc = connect(&mut manager, EdgeKind::Constraint, Some(b), Some(c));
    let ac = connect(&mut manager, EdgeKind::Constraint, Some(a), Some(c));
    update(&mut manager);

    manager.set_edge_unconnected(ab).unwrap();
    manager.set_edge_unconnected(bc).unwrap();
    update(&mut manager);

    assert_eq!(manager.island_count(), 2);
    assert_eq!(island_of(&manager, a), island_of(&manager, c));
    assert_ne!(island_of(&manager, a), island_of(&manager, b));
    assert_eq!(manager.edge_island(ac).unwrap(), Some(island_of(&manager, a)));
}

#[test]
fn connecting_twice_is_idempotent() {
    let mut manager = IslandManager::default();
    let nodes = add_bodies(&mut manager, 2, false);
    let edge = manager
        .add_edge(EdgeKind::Constraint, Some(nodes[0]), Some(nodes[1]))
        .unwrap();

    manager.set_edge_connected(edge).unwrap();
    manager.set_edge_connected(edge).unwrap();
    assert_eq!(manager.events().joined_edges().len(), 1);

    update(&mut manager);

    assert_eq!(manager.island_count(), 1);
    let island = island_of(&manager, nodes[0]);
    assert_eq!(manager.island(island).unwrap().edge_count(), 1);
}

#[test]
fn connect_then_disconnect_cancels_out() {
    let mut manager = IslandManager::default();
    let nodes = add_bodies(&mut manager, 2, false);
    let edge = manager
        .add_edge(EdgeKind::Constraint, Some(nodes[0]), Some(nodes[1]))
        .unwrap();

    manager.set_edge_connected(edge).unwrap();
    manager.set_edge_unconnected(edge).unwrap();

    update(&mut manager);

    assert_eq!(manager.island_count(), 2);
    assert_eq!(manager.edge_island(edge).unwrap(), None);
    assert!(manager.events().is_empty());
}

#[test]
fn tree_round_trip() {
    const N: u32 = 64;

    let mut manager = IslandManager::with_capacity(N as usize);
    let nodes = add_bodies(&mut manager, N, false);

    // Each node connects to its parent in a binary tree.
    let edges: Vec<EdgeHandle> = (1..N as usize)
        .map(|i| {
            connect(
                &mut manager,
                EdgeKind::Constraint,
                Some(nodes[i]),
                Some(nodes[(i - 1) / 2]),
            )
        })
        .collect();

    update(&mut manager);

    assert_eq!(manager.island_count(), 1);
    let island = island_of(&manager, nodes[0]);
    assert_eq!(manager.island(island).unwrap().node_count(), N);
    assert_eq!(manager.island(island).unwrap().edge_count(), N - 1);
    assert_eq!(manager.island_bodies(island).count(), N as usize);

    for edge in edges {
        manager.remove_edge(edge).unwrap();
    }
    update(&mut manager);

    assert_eq!(manager.island_count(), N as usize);
    assert_eq!(manager.edge_count(), 0);
    for &node in &nodes {
        let island = island_of(&manager, node);
        assert_eq!(manager.island(island).unwrap().node_count(), 1);
    }
    manager.validate();
}

#[test]
fn removed_nodes_leave_their_island() {
    let mut manager = IslandManager::default();
    let [a, b]: [NodeHandle; 2] = add_bodies(&mut manager, 2, false).try_into().unwrap();
    let edge = connect(&mut manager, EdgeKind::Constraint, Some(a), Some(b));
    update(&mut manager);

    manager.remove_edge(edge).unwrap();
    manager.remove_node(b).unwrap();
    update(&mut manager);

    assert_eq!(manager.island_count(), 1);
    assert_eq!(manager.node_count(), 1);
    let island = island_of(&manager, a);
    assert_eq!(manager.island(island).unwrap().node_count(), 1);
    assert_eq!(manager.island(island).unwrap().edge_count(), 0);

    // Removing the last node frees its island.
    manager.remove_node(a).unwrap();
    update(&mut manager);
    assert_eq!(manager.island_count(), 0);
}

#[test]
fn kinematic_bodies_do_not_bridge_islands() {
    let mut manager = IslandManager::default();
    let [a, b]: [NodeHandle; 2] = add_bodies(&mut manager, 2, false).try_into().unwrap();
    let kinematic = manager
        .add_node(body(10), BodyKind::Kinematic, false)
        .unwrap();

    for (i, node) in [a, b].into_iter().enumerate() {
        let edge = connect(
            &mut manager,
            EdgeKind::ContactManager,
            Some(node),
            Some(kinematic),
        );
        manager
            .set_edge_contact_manager(edge, Some(ContactManagerId(i as u32)))
            .unwrap();
    }

    for _ in 0..2 {
        manager.update_islands().unwrap();

        // While the update is in progress, the kinematic body is represented by one proxy per edge.
        assert_ne!(island_of(&manager, a), island_of(&manager, b));
        assert_eq!(manager.node_island(kinematic).unwrap(), None);
        assert_eq!(manager.counts().kinematic_proxies, 2);

        let output = manager.output();
        assert_eq!(output.solver_island_count(), 2);
        assert_eq!(output.kinematics(), &[body(10)]);

        for island in output.solver_islands() {
            assert_eq!(island.bodies.len(), 1);
            assert_eq!(island.contact_managers.len(), 1);
            let contact = island.contact_managers[0];
            assert!(matches!(contact.endpoint1, SolverEndpoint::Body(_)));
            assert_eq!(contact.endpoint2, SolverEndpoint::Kinematic(0));
        }

        manager.update_islands_second_pass().unwrap();
        manager.free_buffers();

        // The proxies are merged back into the kinematic body.
        assert!(manager.node_island(kinematic).unwrap().is_some());
        assert_eq!(manager.node_count(), 3);
        manager.validate();
    }
}

#[test]
fn lone_kinematic_body_keeps_its_island() {
    let mut manager = IslandManager::default();
    let kinematic = manager
        .add_node(body(0), BodyKind::Kinematic, false)
        .unwrap();

    update(&mut manager);

    assert_eq!(manager.island_count(), 1);
    assert!(manager.node_island(kinematic).unwrap().is_some());
    // Kinematic bodies on their own are not solver work.
    assert_eq!(manager.output().solver_island_count(), 0);
    assert!(manager.output().kinematics().is_empty());
}

#[test]
fn switching_to_kinematic_splits_islands_through_it() {
    let mut manager = IslandManager::default();
    let [a, b, c]: [NodeHandle; 3] =
        add_bodies(&mut manager, 3, false).try_into().unwrap();
    connect(&mut manager, EdgeKind::Constraint, Some(a), Some(b));
    connect(&mut manager, EdgeKind::Constraint, Some(b), Some(c));
    update(&mut manager);
    assert_eq!(manager.output().solver_island_count(), 1);

    manager.set_kinematic(b, true).unwrap();
    assert_eq!(manager.counts().kinematics, 1);
    assert_eq!(manager.counts().rigid_bodies, 2);

    manager.update_islands().unwrap();
    assert_eq!(manager.output().solver_island_count(), 2);
    assert_ne!(island_of(&manager, a), island_of(&manager, c));
    manager.free_buffers();

    manager.set_kinematic(b, false).unwrap();
    update(&mut manager);
    assert_eq!(manager.output().solver_island_count(), 1);
    assert_eq!(manager.counts().kinematic_proxies, 0);
}

#[test]
fn sleeping_islands_are_left_out_of_the_solver_output() {
    let mut manager = IslandManager::default();
    let [a, b]: [NodeHandle; 2] = add_bodies(&mut manager, 2, true).try_into().unwrap();
    let c = manager
        .add_node(body(2), BodyKind::Dynamic, false)
        .unwrap();

    let ab = connect(&mut manager, EdgeKind::Constraint, Some(a), Some(b));
    manager.set_edge_constraint(ab, body(100)).unwrap();
    update(&mut manager);

    let output = manager.output();
    assert_eq!(output.solver_island_count(), 1);
    assert_eq!(output.bodies(), &[body(2)]);
    assert!(output.constraints().is_empty());
    assert_eq!(output.bodies_to_sleep().len(), 2);
    assert!(
        output
            .bodies_to_sleep()
            .contains(&IslandBody::RigidBody(body(0)))
    );
    assert!(manager.is_in_sleeping_island(a).unwrap());
    assert!(!manager.is_in_sleeping_island(c).unwrap());

    // Touching the sleeping island from the awake one wakes it up.
    let bc = connect(&mut manager, EdgeKind::Constraint, Some(b), Some(c));
    manager.set_edge_constraint(bc, body(101)).unwrap();
    update(&mut manager);

    let output = manager.output();
    assert_eq!(output.solver_island_count(), 1);
    assert_eq!(output.bodies().len(), 3);
    assert_eq!(output.constraints().len(), 2);
    assert_eq!(output.bodies_to_wake().len(), 2);
    assert!(output.bodies_to_sleep().is_empty());
    assert!(!manager.is_in_sleeping_island(a).unwrap());
}

#[test]
fn update_is_skipped_when_everything_is_asleep() {
    let mut manager = IslandManager::default();
    let nodes = add_bodies(&mut manager, 2, true);
    connect(
        &mut manager,
        EdgeKind::Constraint,
        Some(nodes[0]),
        Some(nodes[1]),
    );

    update(&mut manager);
    assert!(manager.is_everything_asleep());

    manager.update_islands().unwrap();
    assert!(!manager.update_performed());
    manager.free_buffers();

    // Any change brings the next update back.
    manager.set_ready_for_sleeping(nodes[0], false).unwrap();
    manager.update_islands().unwrap();
    assert!(manager.update_performed());
    assert_eq!(manager.output().solver_island_count(), 1);
    assert_eq!(manager.output().bodies_to_wake().len(), 2);
    manager.free_buffers();
    assert!(!manager.is_everything_asleep());
}

/// Creates two sleeping bodies touching each other, with no contact manager for the pair yet.
fn sleeping_pair() -> (IslandManager, NodeHandle, NodeHandle, EdgeHandle) {
    let mut manager = IslandManager::default();
    let [a, b]: [NodeHandle; 2] = add_bodies(&mut manager, 2, true).try_into().unwrap();
    let edge = connect(&mut manager, EdgeKind::ContactManager, Some(a), Some(b));
    update(&mut manager);
    assert_eq!(manager.output().solver_island_count(), 0);
    (manager, a, b, edge)
}

#[test]
fn second_pass_splits_pairs_that_stopped_touching() {
    let (mut manager, a, b, edge) = sleeping_pair();

    manager.set_ready_for_sleeping(a, false).unwrap();
    manager.update_islands().unwrap();

    // The island is waking up, but its pair has no contact manager yet.
    let output = manager.output();
    assert_eq!(output.solver_island_count(), 0);
    assert_eq!(output.narrow_phase_edges(), &[edge]);
    assert_eq!(output.second_pass_islands().len(), 1);
    assert_eq!(output.bodies_to_wake().len(), 2);

    // The narrow phase finds that the bodies are no longer touching.
    manager.set_edge_unconnected(edge).unwrap();
    manager.remove_sleeping_pair_contact_managers();
    assert!(manager.output().narrow_phase_edges().is_empty());

    manager.update_islands_second_pass().unwrap();

    let output = manager.output();
    assert_eq!(output.solver_island_count(), 1);
    assert_eq!(output.bodies(), &[body(0)]);
    assert_eq!(output.bodies_to_sleep(), &[IslandBody::RigidBody(body(1))]);
    assert_ne!(island_of(&manager, a), island_of(&manager, b));
    assert!(manager.events().broken_edges().is_empty());

    manager.free_buffers();
    assert_eq!(manager.island_count(), 2);
    assert!(!manager.is_everything_asleep());
}

#[test]
fn second_pass_solves_pairs_with_new_contact_managers() {
    let (mut manager, a, _, edge) = sleeping_pair();

    manager.set_ready_for_sleeping(a, false).unwrap();
    manager.update_islands().unwrap();

    manager
        .set_edge_contact_manager(edge, Some(ContactManagerId(7)))
        .unwrap();
    let woken: Vec<_> = manager.woken_pair_contact_managers().collect();
    assert_eq!(woken, vec![(edge, ContactManagerId(7))]);

    manager.update_islands_second_pass().unwrap();

    let output = manager.output();
    assert_eq!(output.solver_island_count(), 1);
    let island = output.solver_islands().next().unwrap();
    assert_eq!(island.bodies.len(), 2);
    assert_eq!(island.contact_managers.len(), 1);
    assert_eq!(island.contact_managers[0].contact_manager, ContactManagerId(7));
    assert_eq!(island.contact_managers[0].edge, edge);
    assert!(!island.has_static_contact);

    manager.free_buffers();
}

#[test]
fn second_pass_defers_edges_outside_its_islands() {
    let (mut manager, a, _, edge) = sleeping_pair();
    let [c, d]: [NodeHandle; 2] = add_bodies(&mut manager, 2, false).try_into().unwrap();
    let cd = connect(&mut manager, EdgeKind::Constraint, Some(c), Some(d));
    update(&mut manager);

    manager.set_ready_for_sleeping(a, false).unwrap();
    manager.update_islands().unwrap();

    // `cd` is in an island that does not wait for the second pass.
    manager.set_edge_unconnected(cd).unwrap();
    manager
        .set_edge_contact_manager(edge, Some(ContactManagerId(0)))
        .unwrap();
    manager.update_islands_second_pass().unwrap();

    assert_eq!(manager.events().broken_edges().len(), 1);
    assert_eq!(island_of(&manager, c), island_of(&manager, d));
    manager.free_buffers();

    // The next update applies it.
    update(&mut manager);
    assert_ne!(island_of(&manager, c), island_of(&manager, d));
}

#[test]
fn static_contacts_are_flagged() {
    let mut manager = IslandManager::default();
    let node = manager
        .add_node(body(0), BodyKind::Dynamic, false)
        .unwrap();
    let ground = connect(&mut manager, EdgeKind::ContactManager, Some(node), None);
    manager
        .set_edge_contact_manager(ground, Some(ContactManagerId(3)))
        .unwrap();

    update(&mut manager);

    let island = manager.output().solver_islands().next().unwrap();
    assert!(island.has_static_contact);
    assert_eq!(island.contact_managers[0].endpoint1, SolverEndpoint::Body(0));
    assert_eq!(island.contact_managers[0].endpoint2, SolverEndpoint::World);
}

#[test]
fn articulations_are_listed_by_root_link() {
    let mut manager = IslandManager::default();
    let root = manager.add_articulation_link(body(0), false).unwrap();
    let child = manager.add_articulation_link(body(1), false).unwrap();
    let ball = manager
        .add_node(body(2), BodyKind::Dynamic, false)
        .unwrap();
    let articulation = body(50);

    manager.set_articulation_root(root, articulation).unwrap();
    let joint = connect(
        &mut manager,
        EdgeKind::ArticulationJoint,
        Some(root),
        Some(child),
    );
    manager.set_edge_articulation_joint(joint, body(51)).unwrap();
    let contact = connect(
        &mut manager,
        EdgeKind::ContactManager,
        Some(child),
        Some(ball),
    );
    manager
        .set_edge_contact_manager(contact, Some(ContactManagerId(0)))
        .unwrap();

    update(&mut manager);

    let output = manager.output();
    assert_eq!(output.solver_island_count(), 1);
    assert_eq!(output.articulations(), &[body(0)]);
    assert_eq!(output.articulation_owners(), &[articulation]);
    assert_eq!(output.bodies(), &[body(2)]);
    // Articulation joints are solved by the articulation itself.
    assert!(output.constraints().is_empty());
    assert_eq!(output.contact_managers().len(), 1);
    assert_eq!(
        output.contact_managers()[0].endpoint1,
        SolverEndpoint::Articulation(body(1))
    );
    assert_eq!(output.contact_managers()[0].endpoint2, SolverEndpoint::Body(0));

    assert!(matches!(
        manager.set_kinematic(root, true),
        Err(IslandError::ArticulatedKinematic(_))
    ));
    assert!(matches!(
        manager.set_articulation_root(ball, articulation),
        Err(IslandError::NotArticulationLink(_))
    ));
}

#[test]
fn sleeping_articulations_are_reported_once() {
    let mut manager = IslandManager::default();
    let root = manager.add_articulation_link(body(0), true).unwrap();
    let child = manager.add_articulation_link(body(1), true).unwrap();
    manager.set_articulation_root(root, body(50)).unwrap();
    connect(
        &mut manager,
        EdgeKind::ArticulationJoint,
        Some(root),
        Some(child),
    );

    update(&mut manager);

    assert_eq!(
        manager.output().bodies_to_sleep(),
        &[IslandBody::Articulation(body(50))]
    );
}

#[test]
fn stale_handles_are_rejected() {
    let mut manager = IslandManager::default();
    let [a, b]: [NodeHandle; 2] = add_bodies(&mut manager, 2, false).try_into().unwrap();
    let edge = manager
        .add_edge(EdgeKind::Constraint, Some(a), Some(b))
        .unwrap();

    manager.remove_edge(edge).unwrap();
    assert!(matches!(
        manager.remove_edge(edge),
        Err(IslandError::InvalidEdge(_))
    ));
    assert!(matches!(
        manager.set_edge_connected(edge),
        Err(IslandError::InvalidEdge(_))
    ));

    manager.remove_node(b).unwrap();
    assert!(matches!(manager.node(b), Err(IslandError::InvalidNode(_))));
    assert!(matches!(
        manager.add_edge(EdgeKind::Constraint, Some(a), Some(b)),
        Err(IslandError::InvalidNode(_))
    ));

    update(&mut manager);

    // The slot is reused, but the old handle stays invalid.
    let c = manager
        .add_node(body(2), BodyKind::Dynamic, false)
        .unwrap();
    assert_eq!(c.index(), b.index());
    assert!(manager.node(b).is_err());
    assert!(manager.node(c).is_ok());
}

#[test]
fn invalid_edges_are_rejected() {
    let mut manager = IslandManager::default();
    let a = manager
        .add_node(body(0), BodyKind::Dynamic, false)
        .unwrap();

    assert!(matches!(
        manager.add_edge(EdgeKind::ContactManager, None, None),
        Err(IslandError::StaticEdge)
    ));
    assert!(matches!(
        manager.add_edge(EdgeKind::Constraint, Some(a), Some(a)),
        Err(IslandError::SelfEdge(_))
    ));

    let edge = manager
        .add_edge(EdgeKind::Constraint, Some(a), None)
        .unwrap();
    assert!(matches!(
        manager.set_edge_contact_manager(edge, Some(ContactManagerId(0))),
        Err(IslandError::EdgeKindMismatch(_))
    ));
}

#[test]
fn graph_cannot_change_during_an_update() {
    let mut manager = IslandManager::default();
    let a = manager
        .add_node(body(0), BodyKind::Dynamic, false)
        .unwrap();

    assert!(matches!(
        manager.update_islands_second_pass(),
        Err(IslandError::SecondPassWithoutFirstPass)
    ));

    manager.update_islands().unwrap();
    assert!(manager.is_update_in_progress());

    assert!(matches!(
        manager.add_node(body(1), BodyKind::Dynamic, false),
        Err(IslandError::UpdateInProgress)
    ));
    assert!(matches!(
        manager.remove_node(a),
        Err(IslandError::UpdateInProgress)
    ));
    assert!(matches!(
        manager.update_islands(),
        Err(IslandError::UpdateInProgress)
    ));

    manager.free_buffers();
    assert!(!manager.is_update_in_progress());
    assert!(manager.add_node(body(1), BodyKind::Dynamic, false).is_ok());
}

#[test]
fn update_is_aborted_over_budget() {
    let mut manager = IslandManager::new(IslandManagerConfig {
        work_buffer_budget: Some(1),
        ..default()
    });
    let nodes = add_bodies(&mut manager, 4, false);
    connect(
        &mut manager,
        EdgeKind::Constraint,
        Some(nodes[0]),
        Some(nodes[1]),
    );

    let result = manager.update_islands();
    assert!(matches!(result, Err(IslandError::OutOfMemory { .. })));
    assert!(!manager.is_update_in_progress());

    // The islands are untouched, and the changes stay queued.
    assert_eq!(manager.island_count(), 0);
    assert_eq!(manager.events().created_nodes().len(), 4);
    assert_eq!(manager.events().joined_edges().len(), 1);

    manager.set_config(IslandManagerConfig::default());
    update(&mut manager);
    assert_eq!(manager.island_count(), 3);
    assert!(manager.work_buffers().allocated_bytes() > 0);
}

#[test]
fn inline_update_runs_both_passes() {
    let (mut manager, a, b, edge) = sleeping_pair();

    manager.set_ready_for_sleeping(a, false).unwrap();
    manager.set_edge_unconnected(edge).unwrap();
    manager.update_inline().unwrap();
    manager.free_buffers();

    assert_ne!(island_of(&manager, a), island_of(&manager, b));
    assert_eq!(manager.output().solver_island_count(), 1);
}

fn create_app() -> App {
    let mut app = App::new();

    app.add_plugins((MinimalPlugins, IslandPlugin::new(Update)));

    app.finish();

    app
}

#[test]
fn it_loads_plugin_without_errors() {
    let mut app = create_app();

    for _ in 0..10 {
        app.update();
    }

    let manager = app.world().resource::<IslandManager>();
    assert!(!manager.is_update_in_progress());
    assert_eq!(manager.island_count(), 0);
}

#[test]
fn plugin_runs_narrow_phase_between_passes() {
    let mut app = create_app();

    // Attach contact managers to every pair that the first pass asks about.
    app.add_systems(
        Update,
        (|mut manager: ResMut<IslandManager>| {
            let edges = manager.output().narrow_phase_edges().to_vec();
            for edge in edges {
                manager
                    .set_edge_contact_manager(edge, Some(ContactManagerId(edge.index())))
                    .unwrap();
            }
        })
        .in_set(IslandSystems::NarrowPhase),
    );

    let mut manager = app.world_mut().resource_mut::<IslandManager>();
    let [a, b]: [NodeHandle; 2] = add_bodies(&mut manager, 2, true).try_into().unwrap();
    connect(&mut manager, EdgeKind::ContactManager, Some(a), Some(b));

    app.update();
    assert!(
        app.world()
            .resource::<IslandManager>()
            .is_everything_asleep()
    );

    app.world_mut()
        .resource_mut::<IslandManager>()
        .set_ready_for_sleeping(a, false)
        .unwrap();
    app.update();

    let manager = app.world().resource::<IslandManager>();
    assert!(!manager.is_update_in_progress());
    assert_eq!(manager.output().solver_island_count(), 1);
    assert_eq!(manager.output().contact_managers().len(), 1);

    let diagnostics = app.world().resource::<IslandDiagnostics>();
    assert_eq!(diagnostics.island_count, 1);
    assert_eq!(diagnostics.awake_island_count, 1);
    assert_eq!(diagnostics.second_pass_island_count, 1);
    assert_eq!(diagnostics.bodies_woken, 2);
}
