//! Benchmarks for the DDL and query pipeline
//!
//! These benchmarks measure normalization, schema building and query
//! resolution on generated MySQL-flavored dumps of growing size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mangosql_sql::{normalize, parse_queries, parse_schema};

/// Generate a MySQL dump with N tables, each referencing the previous one
fn generate_mysql_dump(num_tables: usize) -> String {
    let mut dump = String::from("/*!40101 SET NAMES utf8mb4 */;\n");

    for i in 0..num_tables {
        let reference = if i > 0 {
            format!(
                ",\n  CONSTRAINT `table_{i}_parent_fk` FOREIGN KEY (`parent_id`) REFERENCES `table_{}` (`id`)",
                i - 1
            )
        } else {
            String::new()
        };

        dump.push_str(&format!(
            "DROP TABLE IF EXISTS `table_{i}`;\n\
             CREATE TABLE `table_{i}` (\n  \
               `id` int(11) unsigned NOT NULL AUTO_INCREMENT,\n  \
               `parent_id` int(11) DEFAULT NULL,\n  \
               `name` varchar(255) COLLATE utf8mb4_unicode_ci NOT NULL COMMENT 'display name',\n  \
               `state` enum('draft','live') NOT NULL DEFAULT 'draft',\n  \
               `created_at` datetime DEFAULT CURRENT_TIMESTAMP,\n  \
               PRIMARY KEY (`id`),\n  \
               UNIQUE KEY `table_{i}_name_unique` (`name`),\n  \
               KEY `table_{i}_parent_idx` (`parent_id`){reference}\n\
             ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;\n\
             INSERT INTO `table_{i}` VALUES (1,NULL,'first','live','2024-01-01 00:00:00');\n"
        ));
    }

    dump
}

/// Generate one join query per table pair
fn generate_queries(num_tables: usize) -> String {
    (1..num_tables)
        .map(|i| {
            format!(
                "-- FindTable{i}:table_{i}\n\
                 SELECT c.*, p.name, count(p.id) AS parents\n\
                 FROM table_{i} c JOIN table_{} p ON p.id = c.parent_id\n\
                 WHERE c.state = 'live'\n\
                 GROUP BY c.id, p.name;\n",
                i - 1
            )
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for num_tables in [10, 100, 500].iter() {
        let dump = generate_mysql_dump(*num_tables);

        group.bench_with_input(BenchmarkId::from_parameter(num_tables), num_tables, |b, _| {
            b.iter(|| black_box(normalize(&dump)));
        });
    }

    group.finish();
}

fn bench_parse_schema(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_schema");

    for num_tables in [10, 100, 500].iter() {
        let dump = generate_mysql_dump(*num_tables);

        group.bench_with_input(BenchmarkId::from_parameter(num_tables), num_tables, |b, _| {
            b.iter(|| black_box(parse_schema(&dump).unwrap()));
        });
    }

    group.finish();
}

fn bench_parse_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_queries");

    for num_tables in [10, 100].iter() {
        let schema = parse_schema(&generate_mysql_dump(*num_tables)).unwrap();
        let queries = generate_queries(*num_tables);

        group.bench_with_input(BenchmarkId::from_parameter(num_tables), num_tables, |b, _| {
            b.iter(|| {
                let mut schema = schema.clone();
                parse_queries(&mut schema, &queries).unwrap();
                black_box(schema.queries.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_parse_schema, bench_parse_queries);

criterion_main!(benches);
