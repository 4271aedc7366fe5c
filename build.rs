use entities::ENTITIES;
use std::env;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

// Emits a sorted `(name, replacement)` table for HTML entity references.
// `entity::lookup` receives the bare name ("amp" for "&amp;"), so only
// entities with a trailing ";" are kept, stripped of "&" and ";", and the
// table is sorted so the lookup can binary-search it.
fn main() {
    let out_dir: PathBuf = env::var("OUT_DIR").unwrap().parse().unwrap();

    let mut named = ENTITIES
        .iter()
        .filter(|e| e.entity.starts_with('&') && e.entity.ends_with(';'))
        .map(|e| (&e.entity[1..e.entity.len() - 1], e.characters))
        .collect::<Vec<_>>();
    named.sort_by_key(|&(name, _)| name);

    let out = std::fs::File::create(out_dir.join("entities.rs")).unwrap();
    let mut bw = BufWriter::new(out);
    writeln!(
        bw,
        "pub(crate) static NAMED_ENTITIES: [(&str, &str); {}] = [",
        named.len()
    )
    .unwrap();
    for (name, characters) in named {
        writeln!(bw, "    ({:?}, {:?}),", name, characters).unwrap();
    }
    writeln!(bw, "];").unwrap();
}
