//! Privileged-syscall filter (Linux only).
//!
//! The Linux counterpart of the Win32k system-call disable policy. Once installed the
//! filter stays for the life of the process and is inherited by every thread the runtime
//! creates afterwards.
//!
//! Denied with EPERM:
//! - ptrace
//! - mount / umount2
//! - keyctl
//! - kexec_load / kexec_file_load
//! - pivot_root / chroot
//! - unshare with CLONE_NEWUSER
//!
//! Thread creation (`clone`) and local sockets stay allowed: the runtime needs both.
//!
//! Architecture support: x86_64 and aarch64

#![cfg(target_os = "linux")]

use std::io;

const CLONE_NEWUSER: u32 = 0x1000_0000;

#[cfg(target_arch = "x86_64")]
mod syscall_nr {
    pub const AUDIT_ARCH: u32 = 0xC000_003E;
    pub const PTRACE: u32 = 101;
    pub const MOUNT: u32 = 165;
    pub const UMOUNT2: u32 = 166;
    pub const KEYCTL: u32 = 250;
    pub const KEXEC_LOAD: u32 = 246;
    pub const KEXEC_FILE_LOAD: u32 = 320;
    pub const PIVOT_ROOT: u32 = 155;
    pub const CHROOT: u32 = 161;
    pub const UNSHARE: u32 = 272;
}

#[cfg(target_arch = "aarch64")]
mod syscall_nr {
    pub const AUDIT_ARCH: u32 = 0xC000_00B7;
    pub const PTRACE: u32 = 117;
    pub const MOUNT: u32 = 40;
    pub const UMOUNT2: u32 = 39;
    pub const KEYCTL: u32 = 219;
    pub const KEXEC_LOAD: u32 = 104;
    pub const KEXEC_FILE_LOAD: u32 = 294;
    pub const PIVOT_ROOT: u32 = 41;
    pub const CHROOT: u32 = 51;
    pub const UNSHARE: u32 = 97;
}

const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
const EPERM: u32 = 1;
const SECCOMP_SET_MODE_FILTER: u32 = 1;
const PR_SET_NO_NEW_PRIVS: i32 = 38;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SockFilter {
    code: u16,
    jt: u8,
    jf: u8,
    k: u32,
}

impl SockFilter {
    const fn new(code: u16, jt: u8, jf: u8, k: u32) -> Self {
        Self { code, jt, jf, k }
    }
}

#[repr(C)]
struct SockFprog {
    len: u16,
    filter: *const SockFilter,
}

const BPF_LD: u16 = 0x00;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_ALU: u16 = 0x04;
const BPF_AND: u16 = 0x50;
const BPF_JMP: u16 = 0x05;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;
const BPF_RET: u16 = 0x06;

// struct seccomp_data offsets
const SECCOMP_DATA_NR: u32 = 0;
const SECCOMP_DATA_ARCH: u32 = 4;
const SECCOMP_DATA_ARG0: u32 = 16;

/// Install the filter on the calling process.
///
/// Sets `PR_SET_NO_NEW_PRIVS` first so an unprivileged process may install it.
pub fn apply_privileged_syscall_filter() -> io::Result<()> {
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "syscall filtering is only supported on x86_64 and aarch64",
        ));
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    {
        let ret = unsafe { libc::prctl(PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        let filter = build_privileged_syscall_filter();
        let prog = SockFprog {
            len: filter.len() as u16,
            filter: filter.as_ptr(),
        };

        let ret = unsafe {
            libc::syscall(
                libc::SYS_seccomp,
                SECCOMP_SET_MODE_FILTER as libc::c_ulong,
                0 as libc::c_ulong,
                &prog as *const SockFprog as libc::c_ulong,
            )
        };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn build_privileged_syscall_filter() -> Vec<SockFilter> {
    use syscall_nr::*;

    let deny = SockFilter::new(BPF_RET | BPF_K, 0, 0, SECCOMP_RET_ERRNO | EPERM);
    let allow = SockFilter::new(BPF_RET | BPF_K, 0, 0, SECCOMP_RET_ALLOW);
    let load = |offset| SockFilter::new(BPF_LD | BPF_W | BPF_ABS, 0, 0, offset);
    let jeq = |k, jt, jf| SockFilter::new(BPF_JMP | BPF_JEQ | BPF_K, jt, jf, k);

    let mut f = Vec::with_capacity(26);

    // Syscall numbers are only meaningful for the native ABI.
    f.push(load(SECCOMP_DATA_ARCH));
    f.push(jeq(AUDIT_ARCH, 1, 0));
    f.push(deny);

    f.push(load(SECCOMP_DATA_NR));
    for nr in [
        PTRACE,
        MOUNT,
        UMOUNT2,
        KEYCTL,
        KEXEC_LOAD,
        KEXEC_FILE_LOAD,
        PIVOT_ROOT,
        CHROOT,
    ] {
        f.push(jeq(nr, 0, 1));
        f.push(deny);
    }

    // unshare(flags & CLONE_NEWUSER)
    f.push(jeq(UNSHARE, 0, 4));
    f.push(load(SECCOMP_DATA_ARG0));
    f.push(SockFilter::new(BPF_ALU | BPF_AND | BPF_K, 0, 0, CLONE_NEWUSER));
    f.push(jeq(CLONE_NEWUSER, 0, 1));
    f.push(deny);

    f.push(allow);
    f
}

/// Name of the architecture the filter targets, or `"unsupported"`.
pub fn filter_architecture() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    {
        "x86_64"
    }
    #[cfg(target_arch = "aarch64")]
    {
        "aarch64"
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        "unsupported"
    }
}

#[cfg(all(test, any(target_arch = "x86_64", target_arch = "aarch64")))]
mod tests {
    use super::syscall_nr::*;
    use super::*;

    /// Minimal classic-BPF interpreter over `(nr, arch, arg0)`.
    fn run(filter: &[SockFilter], nr: u32, arch: u32, arg0: u32) -> u32 {
        let mut acc = 0u32;
        let mut pc = 0usize;
        loop {
            let ins = filter[pc];
            match ins.code {
                c if c == BPF_LD | BPF_W | BPF_ABS => {
                    acc = match ins.k {
                        SECCOMP_DATA_NR => nr,
                        SECCOMP_DATA_ARCH => arch,
                        SECCOMP_DATA_ARG0 => arg0,
                        other => panic!("unexpected load offset {other}"),
                    };
                    pc += 1;
                }
                c if c == BPF_ALU | BPF_AND | BPF_K => {
                    acc &= ins.k;
                    pc += 1;
                }
                c if c == BPF_JMP | BPF_JEQ | BPF_K => {
                    let skip = if acc == ins.k { ins.jt } else { ins.jf };
                    pc += 1 + skip as usize;
                }
                c if c == BPF_RET | BPF_K => return ins.k,
                other => panic!("unexpected opcode {other:#x}"),
            }
        }
    }

    const DENY: u32 = SECCOMP_RET_ERRNO | EPERM;

    #[test]
    fn test_privileged_syscalls_are_denied() {
        let filter = build_privileged_syscall_filter();
        for nr in [
            PTRACE,
            MOUNT,
            UMOUNT2,
            KEYCTL,
            KEXEC_LOAD,
            KEXEC_FILE_LOAD,
            PIVOT_ROOT,
            CHROOT,
        ] {
            assert_eq!(run(&filter, nr, AUDIT_ARCH, 0), DENY, "syscall {nr}");
        }
    }

    #[test]
    fn test_unshare_denied_only_for_new_user_namespace() {
        let filter = build_privileged_syscall_filter();
        assert_eq!(run(&filter, UNSHARE, AUDIT_ARCH, CLONE_NEWUSER), DENY);
        assert_eq!(
            run(&filter, UNSHARE, AUDIT_ARCH, CLONE_NEWUSER | 0x0002_0000),
            DENY
        );
        // CLONE_NEWNS alone
        assert_eq!(
            run(&filter, UNSHARE, AUDIT_ARCH, 0x0002_0000),
            SECCOMP_RET_ALLOW
        );
    }

    #[test]
    fn test_ordinary_syscalls_pass() {
        let filter = build_privileged_syscall_filter();
        // read, write, and clone on both architectures
        for nr in [0, 1, 63, 64, 56, 220] {
            if [PTRACE, MOUNT, UMOUNT2, KEYCTL, UNSHARE].contains(&nr) {
                continue;
            }
            assert_eq!(run(&filter, nr, AUDIT_ARCH, CLONE_NEWUSER), SECCOMP_RET_ALLOW);
        }
    }

    #[test]
    fn test_foreign_architecture_is_denied() {
        let filter = build_privileged_syscall_filter();
        assert_eq!(run(&filter, 0, 0x4000_0003, 0), DENY);
    }

    #[test]
    fn test_filter_ends_with_allow() {
        let filter = build_privileged_syscall_filter();
        assert_eq!(filter.len(), 26);
        assert_eq!(
            filter.last(),
            Some(&SockFilter::new(BPF_RET | BPF_K, 0, 0, SECCOMP_RET_ALLOW))
        );
        assert_ne!(filter_architecture(), "unsupported");
    }
}
