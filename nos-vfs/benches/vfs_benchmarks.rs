//! VFS benchmarks

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nos_vfs::{FileMode, FsContext, LookupFlags, OpenFlags, SeekWhence, Vfs, VfsConfig};

fn deep_tree(depth: usize) -> (Vfs, String) {
    let vfs = Vfs::new(VfsConfig::default()).unwrap();
    let mut path = String::new();
    for level in 0..depth {
        path.push_str(&format!("/d{}", level));
        vfs.mkdir(&path, 0o755).unwrap();
    }
    path.push_str("/leaf");
    vfs.open(&path, OpenFlags::WRONLY | OpenFlags::CREAT, FileMode::new(0o644))
        .unwrap();
    (vfs, path)
}

fn bench_path_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_path");
    for depth in [1usize, 8, 32] {
        let (vfs, path) = deep_tree(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &path, |b, path| {
            b.iter(|| vfs.resolve_path(black_box(path), LookupFlags::empty()).unwrap())
        });
    }
    group.finish();
}

fn bench_symlink_chain(c: &mut Criterion) {
    let vfs = Vfs::new(VfsConfig::default()).unwrap();
    vfs.mkdir("/target", 0o755).unwrap();
    let root = vfs.root_path();
    vfs.symlink_at(&root, "/target", "/l0").unwrap();
    for i in 1..7 {
        vfs.symlink_at(&root, &format!("/l{}", i - 1), &format!("/l{}", i)).unwrap();
    }
    c.bench_function("resolve_symlink_chain_7", |b| {
        b.iter(|| vfs.resolve_path(black_box("/l6"), LookupFlags::empty()).unwrap())
    });
}

fn bench_tmpfs_write(c: &mut Criterion) {
    let vfs = Vfs::new(VfsConfig::default()).unwrap();
    let chunk = vec![0xa5u8; 4096];
    c.bench_function("tmpfs_write_64k", |b| {
        b.iter(|| {
            let file = vfs
                .open("/bench", OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::TRUNC, FileMode::new(0o644))
                .unwrap();
            for _ in 0..16 {
                file.write(black_box(&chunk)).unwrap();
            }
        })
    });
}

fn bench_tmpfs_read(c: &mut Criterion) {
    let vfs = Vfs::new(VfsConfig::default()).unwrap();
    let file = vfs
        .open("/bench", OpenFlags::RDWR | OpenFlags::CREAT, FileMode::new(0o644))
        .unwrap();
    file.write_all(&vec![1u8; 64 * 1024]).unwrap();
    let mut buf = vec![0u8; 4096];
    c.bench_function("tmpfs_read_4k", |b| {
        b.iter(|| {
            file.seek(0, SeekWhence::Set).unwrap();
            file.read(black_box(&mut buf)).unwrap()
        })
    });
}

fn bench_pipe_round_trip(c: &mut Criterion) {
    let ctx = FsContext::new(Arc::new(Vfs::new(VfsConfig::default()).unwrap()));
    let [r, w] = ctx.sys_pipe().unwrap();
    let mut buf = [0u8; 256];
    c.bench_function("pipe_write_read_256", |b| {
        b.iter(|| {
            ctx.sys_write(w as i32, black_box(&[7u8; 256])).unwrap();
            ctx.sys_read(r as i32, &mut buf).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_path_resolution,
    bench_symlink_chain,
    bench_tmpfs_write,
    bench_tmpfs_read,
    bench_pipe_round_trip
);

criterion_main!(benches);
