use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::path::{PathBuf,Path};
use std::process::Command; // Run programs
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const SAM: &str = "I am Sam. Sam I am. I do not like this Sam I am.\n";

// Text that repeats at many distances, with a long run and some binary noise at the end.
fn sample_data() -> Vec<u8> {
    let mut ans = Vec::new();
    for i in 0..200 {
        ans.extend_from_slice(SAM.as_bytes());
        ans.extend_from_slice(format!("line {}\n",i).as_bytes());
    }
    ans.extend(std::iter::repeat(b'=').take(3000));
    let mut state: u32 = 1;
    for _i in 0..2000 {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        ans.push((state >> 16) as u8);
    }
    ans
}

fn write_temp(temp_dir: &tempfile::TempDir,name: &str,dat: &[u8]) -> Result<PathBuf,Box<dyn std::error::Error>> {
    let path = temp_dir.path().join(name);
    std::fs::write(&path,dat)?;
    Ok(path)
}

fn compress_test(dat: &[u8],method: &str,extra: &[&str]) -> Result<Vec<u8>,Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("qfscompressor")?;
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_temp(&temp_dir,"expanded.bin",dat)?;
    let out_path = temp_dir.path().join("compressed.qfs");
    cmd.arg("compress")
        .arg("-m").arg(method)
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .args(extra)
        .assert()
        .success()
        .stderr(predicate::str::contains(format!("compressed {} into",dat.len())));
    Ok(std::fs::read(out_path)?)
}

fn expand_test(dat: &[u8],method: &str) -> Result<Vec<u8>,Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("qfscompressor")?;
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_temp(&temp_dir,"compressed.qfs",dat)?;
    let out_path = temp_dir.path().join("expanded.bin");
    cmd.arg("expand")
        .arg("-m").arg(method)
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    Ok(std::fs::read(out_path)?)
}

#[test]
fn qfs_compression() -> STDRESULT {
    let dat = sample_data();
    let compressed = compress_test(&dat,"qfs",&[])?;
    assert_eq!(compressed,qfscompressor::qfs::compress_slice(&dat,&qfscompressor::qfs::STD_OPTIONS)?);
    assert!(compressed.len() < dat.len() / 2);
    let compressed = compress_test(SAM.as_bytes(),"qfs",&[])?;
    let qfs_str = "10 FB 00 00 31 E1 49 20 61 6D 20 53 61 6D 05 04 2E 05 0D 20 01 05 2E E3 64 6F 20 6E 6F 74 20 6C 69 6B 65 20 74 68 69 73 1C 1C FD 0A";
    assert_eq!(compressed,hex::decode(qfs_str.replace(" ",""))?);
    Ok(())
}

#[test]
fn qfs_round_trip() -> STDRESULT {
    let dat = sample_data();
    let compressed = compress_test(&dat,"qfs",&["--fast"])?;
    assert_eq!(expand_test(&compressed,"qfs")?,dat);
    let compressed = compress_test(&dat,"qfs",&["--size-field"])?;
    assert_eq!(compressed[0],0x11);
    assert_eq!(expand_test(&compressed,"qfs")?,dat);
    let compressed = compress_test(&[],"qfs",&[])?;
    assert_eq!(compressed,hex::decode("10FB000000FC")?);
    assert_eq!(expand_test(&compressed,"qfs")?,Vec::<u8>::new());
    Ok(())
}

#[test]
fn dbpf_round_trip() -> STDRESULT {
    let dat = sample_data();
    let compressed = compress_test(&dat,"dbpf",&[])?;
    assert_eq!(u32::from_le_bytes([compressed[0],compressed[1],compressed[2],compressed[3]]) as usize,compressed.len());
    assert_eq!(&compressed[4..6],&[0x10,0xFB]);
    assert_eq!(expand_test(&compressed,"dbpf")?,dat);
    Ok(())
}

#[test]
fn corrupt_input_fails() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    // copy reaching behind the start of output
    let in_path = write_temp(&temp_dir,"bad.qfs",&[0x10,0xFB,0x00,0x00,0x04,0x01,0x01,0x78,0xFC])?;
    let out_path = temp_dir.path().join("bad.bin");
    Command::cargo_bin("qfscompressor")?
        .arg("expand")
        .arg("-m").arg("qfs")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("BadOffset"));
    assert!(!Path::new(&out_path).exists());
    // not a QFS stream at all
    let in_path = write_temp(&temp_dir,"text.qfs",SAM.as_bytes())?;
    Command::cargo_bin("qfscompressor")?
        .arg("expand")
        .arg("-m").arg("qfs")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("FileFormatMismatch"));
    Ok(())
}

#[test]
fn checksum_output() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_temp(&temp_dir,"digits.txt","123456789".as_bytes())?;
    Command::cargo_bin("qfscompressor")?
        .arg("checksum")
        .arg("-i").arg(&in_path)
        .assert()
        .success()
        .stdout(predicate::str::diff("0376e6e7\n"));
    let big: Vec<u8> = (0..300000).map(|i| (i % 253) as u8).collect();
    let in_path = write_temp(&temp_dir,"big.bin",&big)?;
    let expected = format!("{:08x}\n",qfscompressor::crc::checksum(&big[0..250000]));
    Command::cargo_bin("qfscompressor")?
        .arg("checksum")
        .arg("--record")
        .arg("-i").arg(&in_path)
        .assert()
        .success()
        .stdout(predicate::str::diff(expected));
    Ok(())
}
