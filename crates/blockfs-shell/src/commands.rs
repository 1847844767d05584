//! Command dispatch.
//!
//! Each input line is split on whitespace; the first word picks the command
//! and the rest are its arguments. Every command returns the text to print.

use std::time::UNIX_EPOCH;

use anyhow::{Context, Result, anyhow, bail};
use blockfs_kernel::{Fd, FileType, Filesystem, FsConfig, NodeId, NodeInfo, SnapshotStore};

use crate::config::expand;

pub const HELP: &str = "\
mount [file]                 load the snapshot (created if absent)
unmount                      save the snapshot and unload
ls [dir]                     list a directory
stat <path>                  show metadata for a path
filestat <id>                show metadata for a node id
create <path>                create an empty file
mkdir <path>                 create a directory
open <path>                  open a file, prints its descriptor
close <fd>                   close a descriptor
read <fd> <offset> <size>    read bytes
write <fd> <offset> <data..> write text at an offset
append <fd> <data..>         write text at the end
truncate <path> <size>       set a file's length
rm <path>                    remove a file
rmdir <path>                 remove an empty directory
link <existing> <new>        create a hard link
symlink <target> <new>       create a symbolic link
unlink <path>                remove a name
readlink <path>              show a symlink's target
cd [dir]                     change directory
pwd                          print working directory
cat <path>                   print a file
help                         this text
exit                         unmount and quit";

/// What the caller should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Print this (may be empty).
    Output(String),
    /// Leave the loop.
    Exit,
}

impl Outcome {
    fn none() -> Self {
        Outcome::Output(String::new())
    }
}

/// Shell state: the snapshot store and the mounted filesystem, if any.
pub struct Shell {
    store: SnapshotStore,
    config: FsConfig,
    fs: Option<Filesystem>,
}

impl Shell {
    pub fn new(store: SnapshotStore, config: FsConfig) -> Self {
        Self {
            store,
            config,
            fs: None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.fs.is_some()
    }

    /// Prompt text, showing the working directory when mounted.
    pub fn prompt(&self) -> String {
        match &self.fs {
            Some(fs) => format!("{} $ ", fs.pwd()),
            None => "$ ".to_string(),
        }
    }

    /// Run one input line.
    pub fn execute(&mut self, line: &str) -> Result<Outcome> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&cmd, args)) = words.split_first() else {
            return Ok(Outcome::none());
        };

        match cmd {
            "help" => Ok(Outcome::Output(HELP.to_string())),
            "exit" | "quit" => {
                if self.is_mounted() {
                    self.unmount()?;
                }
                Ok(Outcome::Exit)
            }
            "mount" => self.mount(args.first().copied()),
            "unmount" => self.unmount(),
            _ => {
                let fs = self
                    .fs
                    .as_mut()
                    .ok_or_else(|| anyhow!("no filesystem mounted (try `mount`)"))?;
                run(fs, cmd, args).map(Outcome::Output)
            }
        }
    }

    fn mount(&mut self, path: Option<&str>) -> Result<Outcome> {
        if self.is_mounted() {
            bail!("already mounted at {}", self.store.path().display());
        }
        if let Some(path) = path {
            self.store = SnapshotStore::new(expand(path));
        }
        let fs = self
            .store
            .mount(self.config.clone())
            .with_context(|| format!("mount {}", self.store.path().display()))?;
        let count = fs.tree().len();
        self.fs = Some(fs);
        Ok(Outcome::Output(format!(
            "mounted {} ({count} nodes)",
            self.store.path().display()
        )))
    }

    fn unmount(&mut self) -> Result<Outcome> {
        let fs = self.fs.as_ref().ok_or_else(|| anyhow!("not mounted"))?;
        self.store
            .unmount(fs)
            .with_context(|| format!("unmount {}", self.store.path().display()))?;
        self.fs = None;
        Ok(Outcome::Output(format!("saved {}", self.store.path().display())))
    }
}

/// Commands that need a mounted filesystem.
fn run(fs: &mut Filesystem, cmd: &str, args: &[&str]) -> Result<String> {
    let out = match cmd {
        "ls" => {
            let dir = args.first().copied().unwrap_or(".");
            fs.list_dir(dir)?
                .iter()
                .map(|info| list_line(fs, dir, info))
                .collect::<Vec<_>>()
                .join("\n")
        }
        "stat" => describe(&fs.stat_path(arg(args, 0, "stat <path>")?)?),
        "filestat" => {
            let id: u64 = parse(args, 0, "filestat <id>")?;
            describe(&fs.stat(NodeId(id))?)
        }
        "create" => {
            let id = fs.create(arg(args, 0, "create <path>")?)?;
            format!("created #{id}")
        }
        "mkdir" => {
            let id = fs.mkdir(arg(args, 0, "mkdir <path>")?)?;
            format!("created #{id}")
        }
        "open" => format!("fd {}", fs.open(arg(args, 0, "open <path>")?)?),
        "close" => {
            let fd = Fd(parse(args, 0, "close <fd>")?);
            if !fs.close(fd) {
                bail!("fd {fd} was not open");
            }
            String::new()
        }
        "read" => {
            let usage = "read <fd> <offset> <size>";
            let fd = Fd(parse(args, 0, usage)?);
            let bytes = fs.read_at(fd, parse(args, 1, usage)?, parse(args, 2, usage)?)?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        "write" => {
            let usage = "write <fd> <offset> <data..>";
            let fd = Fd(parse(args, 0, usage)?);
            let offset = parse(args, 1, usage)?;
            let data = rest(args, 2, usage)?;
            format!("wrote {} bytes", fs.write_at(fd, offset, data.as_bytes())?)
        }
        "append" => {
            let usage = "append <fd> <data..>";
            let fd = Fd(parse(args, 0, usage)?);
            let data = rest(args, 1, usage)?;
            format!("wrote {} bytes", fs.append(fd, data.as_bytes())?)
        }
        "truncate" => {
            let usage = "truncate <path> <size>";
            fs.truncate(arg(args, 0, usage)?, parse(args, 1, usage)?)?;
            String::new()
        }
        "rm" => {
            fs.remove(arg(args, 0, "rm <path>")?)?;
            String::new()
        }
        "rmdir" => {
            fs.remove_dir(arg(args, 0, "rmdir <path>")?)?;
            String::new()
        }
        "link" => {
            let usage = "link <existing> <new>";
            let id = fs.link(arg(args, 0, usage)?, arg(args, 1, usage)?)?;
            format!("created #{id}")
        }
        "symlink" => {
            let usage = "symlink <target> <new>";
            let id = fs.symlink(arg(args, 0, usage)?, arg(args, 1, usage)?)?;
            format!("created #{id}")
        }
        "unlink" => {
            fs.unlink(arg(args, 0, "unlink <path>")?)?;
            String::new()
        }
        "readlink" => fs.readlink(arg(args, 0, "readlink <path>")?)?,
        "cd" => {
            fs.cd(args.first().copied().unwrap_or("/"))?;
            String::new()
        }
        "pwd" => fs.pwd(),
        "cat" => String::from_utf8_lossy(&fs.read_file(arg(args, 0, "cat <path>")?)?).into_owned(),
        other => bail!("unknown command: {other} (try `help`)"),
    };
    Ok(out)
}

fn arg<'a>(args: &[&'a str], index: usize, usage: &str) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| anyhow!("usage: {usage}"))
}

fn parse<T: std::str::FromStr>(args: &[&str], index: usize, usage: &str) -> Result<T> {
    let word = arg(args, index, usage)?;
    word.parse()
        .map_err(|_| anyhow!("not a number: {word} (usage: {usage})"))
}

/// Remaining words rejoined with single spaces.
fn rest(args: &[&str], from: usize, usage: &str) -> Result<String> {
    if args.len() <= from {
        bail!("usage: {usage}");
    }
    Ok(args[from..].join(" "))
}

fn list_line(fs: &Filesystem, dir: &str, info: &NodeInfo) -> String {
    let mark = match info.kind {
        FileType::Directory => 'd',
        FileType::File => '-',
        FileType::Symlink => 'l',
    };
    let mut line = format!("{mark} {:>4} {:>8} {}", info.id, info.size, info.name);
    match info.kind {
        FileType::Directory => line.push('/'),
        FileType::Symlink => {
            if let Ok(target) = fs.readlink(&format!("{dir}/{}", info.name)) {
                line.push_str(" -> ");
                line.push_str(&target);
            }
        }
        FileType::File => {}
    }
    line
}

fn describe(info: &NodeInfo) -> String {
    let modified = info
        .modtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let kind = match info.kind {
        FileType::File => "file",
        FileType::Directory => "directory",
        FileType::Symlink => "symlink",
    };
    format!(
        "name: {}\nid: {}\nkind: {kind}\nsize: {} ({} blocks)\n\
         length: {}\nlinks: {}\nmodified: {modified}",
        info.name, info.id, info.size, info.blocks, info.len, info.links
    )
}
