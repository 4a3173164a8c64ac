//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tabdoc::{FieldTypeMap, XmlElement};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const SALES_TDS: &str = r#"<?xml version='1.0' encoding='utf-8' ?>
<datasource formatted-name='Sales' inline='true' source-platform='win' version='18.1' xmlns:user='http://www.tableausoftware.com/xml/user'>
  <connection class='federated'>
    <named-connections>
      <named-connection caption='pg.local' name='postgres.1234567890123456'>
        <connection authentication='username-password' class='postgres' dbname='sales' odbc-native-protocol='' one-time-sql='' port='5432' server='pg.local' username='analyst' />
      </named-connection>
    </named-connections>
    <relation connection='postgres.1234567890123456' name='Orders' table='[public].[orders]' type='table' />
  </connection>
  <aliases enabled='yes' />
  <column caption='Region' datatype='string' name='[region]' role='dimension' type='nominal' />
  <column caption='Order Total' datatype='real' name='[total]' role='measure' type='quantitative' />
  <layout dim-ordering='alphabetic' dim-percentage='0.5' measure-ordering='alphabetic' measure-percentage='0.4' show-structure='true' />
  <semantic-values>
    <semantic-value key='[Country].[Name]' value='&quot;United States&quot;' />
  </semantic-values>
</datasource>
"#;

pub const LEGACY_TDS: &str = r#"<?xml version='1.0' encoding='utf-8' ?>
<datasource formatted-name='Old' inline='true' version='9.3'>
  <connection class='sqlserver' dbname='warehouse' server='sql01'>
    <relation name='Facts' table='[dbo].[facts]' type='table' />
  </connection>
  <column datatype='integer' name='[id]' role='dimension' type='ordinal' />
</datasource>
"#;

/// Writes a zip with stored members, in order.
pub fn make_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create zip");
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, bytes) in entries {
        writer.start_file(*name, options).expect("start file");
        writer.write_all(bytes).expect("write file");
    }
    writer.finish().expect("finish zip");
}

/// Like [`make_zip`], but `None` entries become directory entries.
pub fn make_zip_with_dirs(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
    let file = File::create(path).expect("create zip");
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, bytes) in entries {
        match bytes {
            Some(bytes) => {
                writer.start_file(*name, options).expect("start file");
                writer.write_all(bytes).expect("write file");
            }
            None => writer.add_directory(*name, options).expect("add directory"),
        }
    }
    writer.finish().expect("finish zip");
}

/// Reads every member of a zip as `(name, bytes)` in archive order.
pub fn read_zip(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = File::open(path).expect("open zip");
    let mut archive = ZipArchive::new(file).expect("read zip");
    (0..archive.len())
        .map(|idx| {
            let mut entry = archive.by_index(idx).expect("entry");
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).expect("read entry");
            (entry.name().to_string(), bytes)
        })
        .collect()
}

pub fn member<'a>(members: &'a [(String, Vec<u8>)], name: &str) -> &'a [u8] {
    members
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, bytes)| bytes.as_slice())
        .unwrap_or_else(|| panic!("member {name} missing"))
}

/// Extract generator that writes a marker file and records the field map.
pub fn recording_generator(
    calls: &mut Vec<FieldTypeMap>,
) -> impl FnMut(&Path, &FieldTypeMap) -> std::io::Result<()> + '_ {
    move |path: &Path, fields: &FieldTypeMap| {
        calls.push(fields.clone());
        std::fs::write(path, b"EXTRACT")
    }
}

/// Element names of the direct children, in order.
pub fn child_names(el: &XmlElement) -> Vec<&str> {
    el.elements().map(|c| c.name.as_str()).collect()
}

pub fn count_joins(el: &XmlElement) -> usize {
    el.count_descendants(&|e| e.name == "relation" && e.attr("type") == Some("join"))
}
