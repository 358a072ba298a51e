//! Shared helpers for building synthetic .pack/.idx fixtures in integration tests.
//!
//! Mirrors the unit-test fixtures in `src/pack.rs`, factored out so
//! multiple integration test binaries can build packs without a real
//! git checkout.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};
use git_object::ObjectType;
use git_pack::entry::{encode_entry_header, encode_ofs_delta_offset};
use git_pack::{IDX_SIGNATURE, IDX_VERSION, PACK_SIGNATURE, PACK_VERSION};

fn type_number(obj_type: ObjectType) -> u8 {
    match obj_type {
        ObjectType::Commit => 1,
        ObjectType::Tree => 2,
        ObjectType::Blob => 3,
        ObjectType::Tag => 4,
    }
}

fn pack_checksum(pack_data: &[u8]) -> ObjectId {
    let mut h = Hasher::new(HashAlgorithm::Sha1);
    h.update(pack_data);
    h.finalize().unwrap()
}

fn compress(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut encoder = ZlibEncoder::new(&mut out, Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap();
    out
}

fn crc32_of(chunks: &[&[u8]]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize()
}

/// One base/non-delta object to place in a synthetic pack.
pub struct PlainObject {
    pub obj_type: ObjectType,
    pub content: Vec<u8>,
}

/// Build a v2 `.idx` file from sorted `(oid, offset, crc32)` entries.
pub fn build_idx(entries: &[(ObjectId, u64, u32)], pack_checksum: &[u8]) -> Vec<u8> {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let mut fanout = [0u32; 256];
    for (oid, _, _) in &sorted {
        fanout[oid.first_byte() as usize] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }
    for count in fanout {
        buf.extend_from_slice(&count.to_be_bytes());
    }
    for (oid, _, _) in &sorted {
        buf.extend_from_slice(oid.as_bytes());
    }
    for (_, _, crc) in &sorted {
        buf.extend_from_slice(&crc.to_be_bytes());
    }
    for (_, offset, _) in &sorted {
        buf.extend_from_slice(&(*offset as u32).to_be_bytes());
    }
    buf.extend_from_slice(pack_checksum);

    let idx_checksum = {
        let mut h = Hasher::new(HashAlgorithm::Sha1);
        h.update(&buf);
        h.finalize().unwrap()
    };
    buf.extend_from_slice(idx_checksum.as_bytes());
    buf
}

/// Build a pack containing only non-delta objects. Returns the pack path and
/// the OIDs in the order given.
pub fn build_plain_pack(dir: &Path, name: &str, objects: &[PlainObject]) -> (PathBuf, Vec<ObjectId>) {
    let pack_path = dir.join(format!("{name}.pack"));
    let idx_path = dir.join(format!("{name}.idx"));

    let mut pack_data = Vec::new();
    pack_data.extend_from_slice(PACK_SIGNATURE);
    pack_data.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack_data.extend_from_slice(&(objects.len() as u32).to_be_bytes());

    let mut entries = Vec::new();
    let mut oids = Vec::new();

    for obj in objects {
        let offset = pack_data.len() as u64;
        let header = encode_entry_header(type_number(obj.obj_type), obj.content.len() as u64);
        let compressed = compress(&obj.content);
        let crc = crc32_of(&[&header, &compressed]);

        let oid = Hasher::hash_object(
            HashAlgorithm::Sha1,
            obj.obj_type.as_bytes().iter().map(|&b| b as char).collect::<String>().as_str(),
            &obj.content,
        )
        .unwrap();

        pack_data.extend_from_slice(&header);
        pack_data.extend_from_slice(&compressed);

        entries.push((oid, offset, crc));
        oids.push(oid);
    }

    let checksum = pack_checksum(&pack_data);
    pack_data.extend_from_slice(checksum.as_bytes());

    std::fs::write(&pack_path, &pack_data).unwrap();
    std::fs::write(&idx_path, build_idx(&entries, checksum.as_bytes())).unwrap();

    (pack_path, oids)
}

/// Build a pack with one base blob followed by one OFS_DELTA blob derived from it.
/// Returns the pack path, the base OID, and the delta target's OID.
pub fn build_ofs_delta_pack(
    dir: &Path,
    name: &str,
    base_content: &[u8],
    target_content: &[u8],
) -> (PathBuf, ObjectId, ObjectId) {
    let pack_path = dir.join(format!("{name}.pack"));
    let idx_path = dir.join(format!("{name}.idx"));

    let delta_bytes = git_pack::delta::compute::compute_delta(base_content, target_content);

    let mut pack_data = Vec::new();
    pack_data.extend_from_slice(PACK_SIGNATURE);
    pack_data.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack_data.extend_from_slice(&2u32.to_be_bytes());

    let base_offset = pack_data.len() as u64;
    let base_header = encode_entry_header(3, base_content.len() as u64);
    let base_compressed = compress(base_content);
    pack_data.extend_from_slice(&base_header);
    pack_data.extend_from_slice(&base_compressed);
    let base_crc = crc32_of(&[&base_header, &base_compressed]);

    let delta_offset = pack_data.len() as u64;
    let delta_header = encode_entry_header(6, delta_bytes.len() as u64);
    let ofs_encoded = encode_ofs_delta_offset(delta_offset - base_offset);
    let delta_compressed = compress(&delta_bytes);
    pack_data.extend_from_slice(&delta_header);
    pack_data.extend_from_slice(&ofs_encoded);
    pack_data.extend_from_slice(&delta_compressed);
    let delta_crc = crc32_of(&[&delta_header, &ofs_encoded, &delta_compressed]);

    let checksum = pack_checksum(&pack_data);
    pack_data.extend_from_slice(checksum.as_bytes());

    let base_oid = Hasher::hash_object(HashAlgorithm::Sha1, "blob", base_content).unwrap();
    let target_oid = Hasher::hash_object(HashAlgorithm::Sha1, "blob", target_content).unwrap();

    std::fs::write(&pack_path, &pack_data).unwrap();
    std::fs::write(
        &idx_path,
        build_idx(
            &[(base_oid, base_offset, base_crc), (target_oid, delta_offset, delta_crc)],
            checksum.as_bytes(),
        ),
    )
    .unwrap();

    (pack_path, base_oid, target_oid)
}
