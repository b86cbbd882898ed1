//! Benchmarks for the DM front end.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dmfront::compile::{compile_file, MemoryTree};
use dmfront::frontend::{simplify, Lexer, Parser};
use dmfront::utils::{Diagnostics, FileId};

const SOURCE: &str = r#"
/mob
	var/health = 100
	var/list/items = list()

	proc/heal(amount = 10)
		health += amount * (1 + 1)
		if (health > 100)
			health = 100
		return health

	proc/sort_items()
		for (var/i = 1, i <= items.len, i++)
			for (var/j = i + 1 to items.len)
				if (items[i] > items[j])
					items.Swap(i, j)

	verb/inventory()
		set name = "Inventory"
		set category = "Items"
		for (var/obj/o in items)
			switch (o.weight)
				if (0 to 5)
					usr << "[o] is light"
				if (6 to 10)
					usr << "[o] is heavy"
				else
					usr << "[o] is [o.weight * 2 / 4] stones"

/obj
	var/weight = 1 << 2
"#;

/// Benchmark lexer speed.
fn bench_lexing(c: &mut Criterion) {
    c.bench_function("lex_mob", |b| {
        b.iter(|| Lexer::from_source(black_box(SOURCE), FileId(0)).tokenize())
    });
}

/// Benchmark parsing speed.
fn bench_parsing(c: &mut Criterion) {
    c.bench_function("parse_mob", |b| {
        b.iter(|| Parser::from_source(black_box(SOURCE), FileId(0)).parse_file())
    });
}

/// Benchmark constant folding over a parsed file.
fn bench_simplify(c: &mut Criterion) {
    let file = Parser::from_source(SOURCE, FileId(0)).parse_file();
    c.bench_function("simplify_mob", |b| {
        b.iter(|| {
            let mut tree = file.clone();
            simplify(black_box(&mut tree));
            tree
        })
    });
}

/// Benchmark proc compilation into recorded operations.
fn bench_compile(c: &mut Criterion) {
    let (file, _) = dmfront::parse_source(SOURCE, FileId(0));
    c.bench_function("compile_mob_procs", |b| {
        b.iter(|| {
            let mut tree = MemoryTree::from_file(&file);
            let mut diagnostics = Diagnostics::new();
            compile_file(black_box(&file), &mut tree, &mut diagnostics)
        })
    });
}

criterion_group!(benches, bench_lexing, bench_parsing, bench_simplify, bench_compile);
criterion_main!(benches);
