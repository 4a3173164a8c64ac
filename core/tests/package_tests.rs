mod common;

use common::{SALES_TDS, make_zip, make_zip_with_dirs, member, read_zip, recording_generator};
use tabdoc::{
    ArchiveCompression, DocumentError, DocumentPackage, IncludeMode, NoExtractGenerator,
    PackageConfig, PackageError, PackageState, WorkingDocument, parse_document,
};

const OTHER_MEMBERS: [(&str, &[u8]); 5] = [
    ("Data/Extracts/orders.hyper", b"old extract bytes"),
    ("Data/sales.csv", b"id,total\n1,10\n"),
    ("Image/logo.png", b"\x89PNG fake"),
    ("Shapes/shape.png", b"shape"),
    ("TwbxExternalCache/cache.bin", b"\x00\x01\x02"),
];

fn sales_archive(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("Foo.tdsx");
    let mut entries: Vec<(&str, &[u8])> = vec![("Foo.tds", SALES_TDS.as_bytes())];
    entries.extend(OTHER_MEMBERS);
    make_zip(&path, &entries);
    path
}

#[test]
fn saving_twice_never_overwrites() {
    let source_dir = tempfile::tempdir().expect("source dir");
    let out_dir = tempfile::tempdir().expect("out dir");
    let source = sales_archive(source_dir.path());
    let original = std::fs::read(&source).expect("read source");

    let mut pkg = DocumentPackage::open(&source, out_dir.path()).expect("open");
    let first = pkg.save(&mut NoExtractGenerator).expect("first save");
    let second = pkg.save(&mut NoExtractGenerator).expect("second save");
    assert_eq!(first, out_dir.path().join("Foo.tdsx"));
    assert_eq!(second, out_dir.path().join("Foo (1).tdsx"));

    let mut in_place = DocumentPackage::open(&source, source_dir.path()).expect("open in place");
    let third = in_place.save(&mut NoExtractGenerator).expect("save beside source");
    assert_eq!(third, source_dir.path().join("Foo (1).tdsx"));
    assert_eq!(std::fs::read(&source).expect("reread source"), original);
}

#[test]
fn replacements_and_untouched_members_are_preserved() {
    let source_dir = tempfile::tempdir().expect("source dir");
    let out_dir = tempfile::tempdir().expect("out dir");
    let source = sales_archive(source_dir.path());

    let new_csv = source_dir.path().join("new.csv");
    let new_logo = source_dir.path().join("logo.png");
    std::fs::write(&new_csv, b"id,total\n2,20\n").expect("write csv");
    std::fs::write(&new_logo, b"new logo").expect("write logo");

    let mut pkg = DocumentPackage::open(&source, out_dir.path()).expect("open");
    assert_eq!(pkg.state(), PackageState::Opened);
    assert_eq!(pkg.document_member(), "Foo.tds");
    assert_eq!(pkg.other_members().len(), 5);

    pkg.queue_replacement("Data/sales.csv", source_dir.path().join("missing.csv"))
        .expect("queue csv");
    pkg.queue_replacement("Data/sales.csv", &new_csv).expect("requeue csv");
    pkg.queue_replacement("Image/logo.png", &new_logo).expect("queue logo");
    assert_eq!(pkg.state(), PackageState::Mutated);

    let output = pkg.save(&mut NoExtractGenerator).expect("save");
    assert_eq!(pkg.state(), PackageState::CleanedUp);

    let members = read_zip(&output);
    let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names[0], "Foo.tds");
    assert_eq!(names.len(), 6);
    for (name, bytes) in OTHER_MEMBERS {
        let written = member(&members, name);
        match name {
            "Data/sales.csv" => assert_eq!(written, b"id,total\n2,20\n"),
            "Image/logo.png" => assert_eq!(written, b"new logo"),
            _ => assert_eq!(written, bytes, "{name} should be byte-identical"),
        }
    }

    let doc = String::from_utf8(member(&members, "Foo.tds").to_vec()).expect("utf-8");
    assert!(doc.starts_with("<?xml"));
    assert_eq!(
        parse_document(&doc, "saved").expect("parse saved"),
        parse_document(SALES_TDS, "source").expect("parse source")
    );
}

#[test]
fn missing_replacement_source_skips_only_that_member() {
    let source_dir = tempfile::tempdir().expect("source dir");
    let out_dir = tempfile::tempdir().expect("out dir");
    let source = sales_archive(source_dir.path());

    let mut pkg = DocumentPackage::open(&source, out_dir.path()).expect("open");
    pkg.queue_replacement("Shapes/shape.png", source_dir.path().join("gone.png"))
        .expect("queue shape");
    let output = pkg.save(&mut NoExtractGenerator).expect("save is best effort");

    let members = read_zip(&output);
    assert!(members.iter().all(|(n, _)| n != "Shapes/shape.png"));
    assert_eq!(members.len(), 5);
}

#[test]
fn directory_entries_are_carried_into_the_saved_archive() {
    let source_dir = tempfile::tempdir().expect("source dir");
    let out_dir = tempfile::tempdir().expect("out dir");
    let source = source_dir.path().join("Foo.tdsx");
    make_zip_with_dirs(
        &source,
        &[
            ("Foo.tds", Some(SALES_TDS.as_bytes())),
            ("Data/", None),
            ("Data/Extracts/", None),
            ("Data/Extracts/a.hyper", Some(&b"hyper"[..])),
        ],
    );

    let mut pkg = DocumentPackage::open(&source, out_dir.path()).expect("open");
    assert_eq!(
        pkg.other_members(),
        ["Data/", "Data/Extracts/", "Data/Extracts/a.hyper"]
    );
    let output = pkg.save(&mut NoExtractGenerator).expect("save");

    let names: Vec<String> = read_zip(&output).into_iter().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        vec!["Foo.tds", "Data/", "Data/Extracts/", "Data/Extracts/a.hyper"]
    );
}

#[test]
fn working_document_cannot_be_queued_as_a_replacement() {
    let source_dir = tempfile::tempdir().expect("source dir");
    let out_dir = tempfile::tempdir().expect("out dir");
    let source = sales_archive(source_dir.path());
    let stray = source_dir.path().join("stray.tds");
    std::fs::write(&stray, b"<datasource version='18.1'/>").expect("write stray");

    let mut pkg = DocumentPackage::open(&source, out_dir.path()).expect("open");
    let err = pkg
        .queue_replacement("Foo.tds", &stray)
        .expect_err("document path is rejected");
    assert!(matches!(
        err,
        PackageError::Document(DocumentError::Configuration { field: "archive_path", .. })
    ));
    assert!(pkg.replacements().is_empty());

    let members = read_zip(&pkg.save(&mut NoExtractGenerator).expect("save"));
    assert_eq!(members.iter().filter(|(n, _)| n == "Foo.tds").count(), 1);
    assert_eq!(members.len(), 6);
}

#[test]
fn generated_extract_is_added_and_scratch_is_removed() {
    let source_dir = tempfile::tempdir().expect("source dir");
    let out_dir = tempfile::tempdir().expect("out dir");
    let source = source_dir.path().join("Fresh.tdsx");
    make_zip(
        &source,
        &[("Fresh.tds", SALES_TDS.as_bytes()), ("Data/notes.txt", b"notes")],
    );

    let config = PackageConfig::builder()
        .compression(ArchiveCompression::Stored)
        .build()
        .expect("config");
    let mut pkg = DocumentPackage::open_with_config(&source, out_dir.path(), config).expect("open");
    let ds = pkg.datasource_mut().expect("datasource document");
    ds.add_extract("fresh").expect("extract");
    ds.add_extract_dimension_filter("region", vec!["West".into()], IncludeMode::Include, false)
        .expect("extract filter");

    let mut calls = Vec::new();
    let output = pkg
        .save(&mut recording_generator(&mut calls))
        .expect("save");
    assert_eq!(calls.len(), 1);

    let members = read_zip(&output);
    assert_eq!(member(&members, "Data/Extracts/fresh.hyper"), b"EXTRACT");
    assert_eq!(member(&members, "Data/notes.txt"), b"notes");
    let doc = String::from_utf8(member(&members, "Fresh.tds").to_vec()).expect("utf-8");
    assert!(doc.contains("dbname=\"Data/Extracts/fresh.hyper\""));

    let leftovers: Vec<_> = std::fs::read_dir(out_dir.path())
        .expect("list out dir")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["Fresh.tdsx".to_string()]);
}

#[test]
fn pre_existing_scratch_directory_is_kept() {
    let source_dir = tempfile::tempdir().expect("source dir");
    let out_dir = tempfile::tempdir().expect("out dir");
    let source = sales_archive(source_dir.path());
    let scratch = out_dir.path().join(".tabdoc-Foo");
    std::fs::create_dir(&scratch).expect("scratch");
    std::fs::write(scratch.join("keep.txt"), b"mine").expect("seed");

    let mut pkg = DocumentPackage::open(&source, out_dir.path()).expect("open");
    pkg.save(&mut NoExtractGenerator).expect("save");

    assert!(scratch.join("keep.txt").exists());
    assert!(!scratch.join("Foo.tds").exists());
}

#[test]
fn failed_extract_generation_aborts_the_save() {
    let source_dir = tempfile::tempdir().expect("source dir");
    let out_dir = tempfile::tempdir().expect("out dir");
    let source = sales_archive(source_dir.path());

    let mut pkg = DocumentPackage::open(&source, out_dir.path()).expect("open");
    pkg.datasource_mut()
        .expect("datasource")
        .add_extract("again")
        .expect("extract");
    let err = pkg.save(&mut NoExtractGenerator).expect_err("generator fails");
    assert!(matches!(err, PackageError::Document(_)));
    assert!(!out_dir.path().join("Foo.tdsx").exists());
}

#[test]
fn archives_without_exactly_one_document_are_rejected() {
    let dir = tempfile::tempdir().expect("dir");
    let none = dir.path().join("none.tdsx");
    make_zip(&none, &[("nested/Inner.tds", b"<datasource version='18.1'/>")]);
    assert!(matches!(
        DocumentPackage::open(&none, dir.path()).err(),
        Some(PackageError::MissingDocument)
    ));

    let two = dir.path().join("two.tdsx");
    make_zip(
        &two,
        &[
            ("A.tds", b"<datasource version='18.1'/>"),
            ("B.tds", b"<datasource version='18.1'/>"),
        ],
    );
    match DocumentPackage::open(&two, dir.path()).err() {
        Some(PackageError::AmbiguousDocument { names }) => assert_eq!(names, vec!["A.tds", "B.tds"]),
        _ => panic!("expected an ambiguous-document error"),
    }

    let not_zip = dir.path().join("plain.tdsx");
    std::fs::write(&not_zip, b"plain text").expect("write");
    let err = DocumentPackage::open(&not_zip, dir.path()).err().expect("not a zip");
    assert_eq!(err.code(), tabdoc::error_codes::CONTAINER_NOT_ZIP);
}

#[test]
fn workbook_packages_edit_embedded_datasources() {
    let dir = tempfile::tempdir().expect("dir");
    let embedded = SALES_TDS
        .trim_start_matches("<?xml version='1.0' encoding='utf-8' ?>\n")
        .trim_end();
    let twb = format!(
        "<?xml version='1.0' encoding='utf-8' ?>\n<workbook version='18.1'>\n  <datasources>\n{embedded}\n  </datasources>\n  <worksheets />\n</workbook>\n"
    );
    let source = dir.path().join("Book.twbx");
    make_zip(&source, &[("Book.twb", twb.as_bytes()), ("Image/a.png", b"a")]);

    let mut pkg = DocumentPackage::open(&source, dir.path()).expect("open");
    assert!(matches!(pkg.document(), WorkingDocument::Workbook(_)));
    pkg.workbook_mut()
        .expect("workbook")
        .datasource_mut("Sales")
        .expect("sales")
        .add_dimension_filter("region", vec!["East".into()], IncludeMode::Include, false)
        .expect("filter");
    let output = pkg.save(&mut NoExtractGenerator).expect("save");
    assert_eq!(output, dir.path().join("Book (1).twbx"));

    let members = read_zip(&output);
    let text = String::from_utf8(member(&members, "Book.twb").to_vec()).expect("utf-8");
    assert!(text.starts_with("<?xml version='1.0' encoding='utf-8' ?>\n<workbook version='18.1'>"));
    assert!(text.ends_with("\n  <worksheets />\n</workbook>\n"));
    assert!(text.contains("member=\"&quot;East&quot;\""));
    assert_eq!(member(&members, "Image/a.png"), b"a");
}
