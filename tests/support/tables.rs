use std::path::{Path, PathBuf};

use cohortfit::dataset::group_file_path;

/// Write `rows` posts for `group` with a structured signal centred on `offset`.
///
/// Posts alternate between two group-specific phrasings that share the word
/// `today`, so a document-frequency ceiling below 1.0 prunes it.
pub fn write_group_table(dir: &Path, group: &str, phase: &str, rows: usize, offset: f32) -> PathBuf {
    let path = group_file_path(dir, group, phase);
    let mut writer = csv::Writer::from_path(&path).expect("create group table");
    writer
        .write_record(["subreddit", "author", "date", "post", "signal", "has_link"])
        .expect("write header");
    for i in 0..rows {
        let post = if i % 2 == 0 {
            format!("{group}talk today about {group}stuff")
        } else {
            format!("{group}news today  sometimes \u{201c}{group}stuff\u{201d}")
        };
        let signal = offset + (i % 7) as f32 * 0.1;
        writer
            .write_record([
                group.to_string(),
                format!("user{i}"),
                format!("2020/01/{:02}", i % 10 + 1),
                post,
                signal.to_string(),
                if i % 3 == 0 { "True" } else { "False" }.to_string(),
            ])
            .expect("write row");
    }
    writer.flush().expect("flush group table");
    path
}

/// One table per group, each with its own signal offset.
pub fn write_groups(dir: &Path, phase: &str, groups: &[(&str, usize)]) {
    for (idx, (group, rows)) in groups.iter().enumerate() {
        write_group_table(dir, group, phase, *rows, idx as f32 * 10.0);
    }
}
