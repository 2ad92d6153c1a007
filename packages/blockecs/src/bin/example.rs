use blockecs::{component, shape, EntityManager, Requirements, Unit, World};

#[derive(Debug, Clone, Copy, Default)]
pub struct Position(f32, f32);

#[derive(Debug, Clone, Copy, Default)]
pub struct Velocity(f32, f32);

component!(Position);
component!(Velocity);

struct Movement(Requirements);

impl Unit for Movement {
    fn update(&mut self, entities: &mut EntityManager, delta_time: f32) {
        self.0.execute_for_entities_matching::<(&mut Position, &Velocity), _>(entities, |(p, v)| {
            p.0 += v.0 * delta_time;
            p.1 += v.1 * delta_time;
        });
    }

    fn draw(&mut self, entities: &EntityManager) {
        for block in entities.matching_blocks(self.0.required()) {
            for (handle, position) in block.handles().iter().zip(block.column::<Position>()) {
                println!("{:?} at {:?}", handle, position);
            }
        }
    }
}

fn main() {
    let mut world = World::new();

    let moving = world.create_entity(&shape![Position, Velocity]);
    world.set_field(moving, Velocity(1.0, 0.5));

    let still = world.create_entity(&shape![Position]);
    world.set_field(still, Position(3.0, 3.0));

    world.add_unit(0, Movement(Requirements::new().require::<Position>().require::<Velocity>()));

    for _ in 0..4 {
        world.update(0.25);
    }
    world.draw();

    println!("moving: {:?}", world.get_field::<Position>(moving));
    println!("still: {:?}", world.get_field::<Position>(still));
}
