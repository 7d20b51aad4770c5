use avian_islands::prelude::*;
use bevy::prelude::*;

use super::{StepCounter, add_body, add_contact, create_app};

/// Boxes riding on kinematic conveyor belts.
#[derive(Resource)]
struct Conveyor {
    belts: Vec<NodeHandle>,
    boxes: Vec<ConveyorBox>,
    next_contact_manager: u32,
}

struct ConveyorBox {
    node: NodeHandle,
    contact: EdgeHandle,
    belt: usize,
}

pub fn create_bench(belt_count: usize, boxes_per_belt: usize) -> App {
    let mut app = create_app(|manager, app| {
        let conveyor = setup(manager, belt_count.max(1), boxes_per_belt.max(1));
        app.insert_resource(conveyor);
    });
    app.add_systems(Update, move_boxes.before(IslandSystems::FirstPass));
    app
}

fn setup(manager: &mut IslandManager, belt_count: usize, boxes_per_belt: usize) -> Conveyor {
    manager
        .pre_allocate(belt_count * (boxes_per_belt + 1))
        .expect("the conveyor should fit in memory");

    let belts: Vec<NodeHandle> = (0..belt_count)
        .map(|i| {
            manager
                .add_node(Entity::from_raw(i as u32), BodyKind::Kinematic, false)
                .expect("the manager should not be updating during setup")
        })
        .collect();

    let mut next_contact_manager = 0;
    let mut boxes = Vec::with_capacity(belt_count * boxes_per_belt);

    for (belt, &belt_node) in belts.iter().enumerate() {
        for _ in 0..boxes_per_belt {
            let node = add_body(manager, (belt_count + boxes.len()) as u32);
            let contact = add_contact(manager, Some(belt_node), Some(node), next_contact_manager);
            next_contact_manager += 1;
            boxes.push(ConveyorBox {
                node,
                contact,
                belt,
            });
        }

        // Neighboring boxes push each other, so each belt carries a few larger islands.
        let first = boxes.len() - boxes_per_belt;
        for pair in boxes[first..].windows(2).step_by(4) {
            add_contact(manager, Some(pair[0].node), Some(pair[1].node), next_contact_manager);
            next_contact_manager += 1;
        }
    }

    Conveyor {
        belts,
        boxes,
        next_contact_manager,
    }
}

/// Moves one box from every belt over to the next belt.
fn move_boxes(mut manager: ResMut<IslandManager>, mut conveyor: ResMut<Conveyor>, step: Res<StepCounter>) {
    let belt_count = conveyor.belts.len();
    let boxes_per_belt = conveyor.boxes.len() / belt_count;

    for belt in 0..belt_count {
        let index = belt * boxes_per_belt + step.0 as usize % boxes_per_belt;
        let contact_manager = conveyor.next_contact_manager;
        conveyor.next_contact_manager += 1;

        let Conveyor { belts, boxes, .. } = &mut *conveyor;
        let conveyor_box = &mut boxes[index];

        manager
            .remove_edge(conveyor_box.contact)
            .expect("contacts should be valid between updates");

        conveyor_box.belt = (conveyor_box.belt + 1) % belt_count;
        conveyor_box.contact = add_contact(
            &mut manager,
            Some(belts[conveyor_box.belt]),
            Some(conveyor_box.node),
            contact_manager,
        );
    }
}
