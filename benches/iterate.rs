use criterion::*;
use std::hint::black_box;
use chunk_ecs::prelude::*;

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    group.bench_function("data_array_write_wealth_100k", |b| {
        b.iter_batched(
            || {
                let mut world = setup_world(AGENTS_MED).unwrap();
                let q = world.query().write::<Wealth>().unwrap().build().unwrap();
                (world, q)
            },
            |(mut world, q)| {
                let mut wealth = world.component_data_array_mut::<Wealth>(&q).unwrap();
                for i in 0..wealth.len() {
                    wealth.get_mut(i).unwrap().value *= 1.0001;
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("data_array_read_productivity_100k", |b| {
        b.iter_batched(
            || {
                let mut world = setup_world(AGENTS_MED).unwrap();
                let q = world.query().read::<Productivity>().unwrap().build().unwrap();
                (world, q)
            },
            |(world, q)| {
                let mut rates = world.component_data_array::<Productivity>(&q).unwrap();
                let mut total = 0.0f32;
                for i in 0..rates.len() {
                    total += rates.get(i).unwrap().rate;
                }
                black_box(total);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("par_chunks_prod_to_wealth_100k", |b| {
        b.iter_batched(
            || {
                let mut world = setup_world(AGENTS_MED).unwrap();
                let q = world
                    .query()
                    .read::<Productivity>().unwrap()
                    .write::<Wealth>().unwrap()
                    .build().unwrap();
                (world, q)
            },
            |(mut world, q)| {
                world
                    .par_for_each_chunk(&q, |mut chunk| {
                        let (rates, wealth) = chunk.read_write::<Productivity, Wealth>()?;
                        for (w, p) in wealth.iter_mut().zip(rates) {
                            w.value += p.rate;
                        }
                        Ok(())
                    })
                    .unwrap();
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("changed_filter_length_100k", |b| {
        b.iter_batched(
            || {
                let mut world = setup_world(AGENTS_MED).unwrap();
                let writer = world.query().write::<Wealth>().unwrap().build().unwrap();
                world.increment_global_system_version();
                world
                    .component_data_array_mut::<Wealth>(&writer).unwrap()
                    .set(AGENTS_MED / 2, Wealth { value: 0.0 }).unwrap();

                let wealth = world.type_index::<Wealth>().unwrap();
                let mut q = world.query().read::<Wealth>().unwrap().build().unwrap();
                world.set_changed_filter(&mut q, &[ComponentType::read_only(wealth)], 1).unwrap();
                (world, q)
            },
            |(world, q)| {
                black_box(world.calculate_length(&q));
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
