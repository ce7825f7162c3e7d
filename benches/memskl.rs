use criterion::*;
use memskl::{Key, SkipMap, Value};
use parking_lot::Mutex;
use rand::prelude::*;
use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread,
};

fn skiplist_round(l: &SkipMap, case: &(Key, bool), exp: &Value) {
  if case.1 {
    if let Some(v) = l.get(&case.0) {
      assert_eq!(v.as_bytes(), exp.as_bytes());
    }
  } else {
    l.put(&case.0, exp).unwrap();
  }
}

fn mutex_map_round(l: &Mutex<HashMap<Vec<u8>, Vec<u8>>>, case: &(Key, bool), exp: &Value) {
  if case.1 {
    let l = l.lock();
    if let Some(v) = l.get(case.0.user_key()) {
      assert_eq!(v.as_slice(), exp.as_bytes());
    }
  } else {
    l.lock()
      .insert(case.0.user_key().to_vec(), exp.as_bytes().to_vec());
  }
}

fn random_key(rng: &mut ThreadRng) -> Key {
  let mut key = vec![0; 16];
  rng.fill_bytes(&mut key);
  Key::from(key).with_version(1)
}

fn bench_read_write_skiplist_frac(b: &mut Bencher<'_>, frac: &usize) {
  let frac = *frac;
  let value = Value::from("00123");
  let list = Arc::new(SkipMap::new(512 << 20));
  let l = list.clone();
  let stop = Arc::new(AtomicBool::new(false));
  let s = stop.clone();
  let v = value.clone();
  let j = thread::spawn(move || {
    let mut rng = rand::thread_rng();
    while !s.load(Ordering::SeqCst) {
      let case = (random_key(&mut rng), frac > rng.gen_range(0..11));
      skiplist_round(&l, &case, &v);
    }
  });
  let mut rng = rand::thread_rng();
  b.iter_batched_ref(
    || (random_key(&mut rng), frac > rng.gen_range(0..11)),
    |case| skiplist_round(&list, case, &value),
    BatchSize::SmallInput,
  );
  stop.store(true, Ordering::SeqCst);
  j.join().unwrap();
}

fn bench_read_write_mutex_map_frac(b: &mut Bencher<'_>, frac: &usize) {
  let frac = *frac;
  let value = Value::from("00123");
  let map = Arc::new(Mutex::new(HashMap::new()));
  let m = map.clone();
  let stop = Arc::new(AtomicBool::new(false));
  let s = stop.clone();
  let v = value.clone();
  let j = thread::spawn(move || {
    let mut rng = rand::thread_rng();
    while !s.load(Ordering::SeqCst) {
      let case = (random_key(&mut rng), frac > rng.gen_range(0..11));
      mutex_map_round(&m, &case, &v);
    }
  });
  let mut rng = rand::thread_rng();
  b.iter_batched_ref(
    || (random_key(&mut rng), frac > rng.gen_range(0..11)),
    |case| mutex_map_round(&map, case, &value),
    BatchSize::SmallInput,
  );
  stop.store(true, Ordering::SeqCst);
  j.join().unwrap();
}

fn bench_read_write(c: &mut Criterion) {
  let mut group = c.benchmark_group("skiplist_read_write");
  for i in 0..=10 {
    group.bench_with_input(
      BenchmarkId::from_parameter(i),
      &i,
      bench_read_write_skiplist_frac,
    );
  }
  group.finish();

  let mut group = c.benchmark_group("mutex_map_read_write");
  for i in 0..=10 {
    group.bench_with_input(
      BenchmarkId::from_parameter(i),
      &i,
      bench_read_write_mutex_map_frac,
    );
  }
  group.finish();
}

criterion_group!(benches, bench_read_write);
criterion_main!(benches);
