use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use blockecs::{component, shape, EntityManager, Requirements, Stopwatch, Unit, World, DEFAULT_BLOCK_SIZE};

#[derive(Parser)]
#[command(name = "stress")]
#[command(about = "Time updates over many entities with eleven fields", long_about = None)]
struct Args {
    /// Number of entities to create
    #[arg(short, long, default_value_t = 1_000_000)]
    entities: usize,

    /// Number of updates to time
    #[arg(short, long, default_value_t = 5)]
    frames: usize,

    /// Bytes allocated per block
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

macro_rules! value_components {
    ($($name:ident = $value:expr),+ $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy)]
            pub struct $name(i32);

            impl Default for $name {
                fn default() -> $name {
                    $name($value)
                }
            }

            component!($name);
        )+
    };
}

value_components!(
    Component0 = 0,
    Component1 = 1,
    Component2 = 2,
    Component3 = 3,
    Component4 = 4,
    Component5 = 5,
    Component6 = 6,
    Component7 = 7,
    Component8 = 8,
    Component9 = 9,
    Component10 = 0,
);

/// Stores the sum of the first ten fields in the eleventh.
struct Sum(Requirements);

impl Unit for Sum {
    fn update(&mut self, entities: &mut EntityManager, _delta_time: f32) {
        self.0.execute_for_entities_matching::<(
            &Component0, &Component1, &Component2, &Component3, &Component4, &Component5,
            &Component6, &Component7, &Component8, &Component9, &mut Component10,
        ), _>(entities, |(c0, c1, c2, c3, c4, c5, c6, c7, c8, c9, c10)| {
            c10.0 = c0.0 + c1.0 + c2.0 + c3.0 + c4.0 + c5.0 + c6.0 + c7.0 + c8.0 + c9.0;
        });
    }
}

fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let shape = shape![
        Component0, Component1, Component2, Component3, Component4, Component5,
        Component6, Component7, Component8, Component9, Component10,
    ];

    let mut stopwatch = Stopwatch::new();
    let mut world = World::with_block_size(args.block_size);
    for _ in 0..args.entities {
        world.create_entity(&shape);
    }
    stopwatch.report("create");

    world.add_unit(0, Sum(Requirements::from(shape)));

    info!(entities = world.entities().len(),
          blocks = world.entities().blocks().len(),
          "starting updates");

    for _ in 0..args.frames {
        stopwatch.start();
        world.update(0.0);
        stopwatch.report("update");
    }

    if args.frames > 0 {
        let mut wrong = 0usize;
        world.entities_mut().for_each::<&Component10, _>(|c| {
            if c.0 != 45 {
                wrong += 1;
            }
        });
        info!(wrong, "done");
    }
}
