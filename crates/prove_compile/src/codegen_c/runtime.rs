//! The fixed runtime ABI the emitter targets.
//!
//! The runtime library itself is an external collaborator; this module only
//! declares its surface so every generated translation unit compiles
//! against the same prototypes. The prelude is emitted at the top of each
//! unit, include-guarded so units can be concatenated or compiled
//! separately.
//!
//! # Ownership protocol
//!
//! Heap values (`Prove_String`, `Prove_List`) carry a `Prove_Header` with a
//! non-atomic refcount and are produced at +1 (owned by the receiving
//! expression). A local owns its value until scope end, where the emitter
//! releases every owned local that is not the returned value. Stores into
//! longer-lived locations (constructor fields, list elements) retain inside
//! the runtime, so call arguments are borrowed.

/// Declarations emitted at the top of every generated `.c` unit.
pub const RUNTIME_PRELUDE: &str = r#"/* Generated by the Prove compiler. Do not edit. */
#ifndef PROVE_RUNTIME_ABI
#define PROVE_RUNTIME_ABI

#include <stdbool.h>
#include <stddef.h>
#include <stdint.h>

/* Every heap value begins with this header. The refcount is not atomic:
   emitted programs are single-threaded. */
typedef struct { int32_t refcount; } Prove_Header;

typedef struct Prove_String Prove_String; /* length-prefixed UTF-8 */
typedef struct Prove_List Prove_List;     /* 8-byte slots + len/cap header */
typedef struct Prove_Table Prove_Table;   /* open-addressed string-keyed map */
typedef struct Prove_Arena Prove_Arena;

enum { PROVE_OK = 0, PROVE_ERR = 1 };

/* The payload-carrying result: Result<T,E> and Option<T> share it.
   Option lowers with a null err on the None arm. */
typedef struct {
    uint8_t tag;
    union { int64_t i; double d; void *ptr; } ok;
    Prove_String *err;
} Prove_Result;

void prove_runtime_init(void);
void prove_runtime_cleanup(void);
void prove_args_init(int argc, char **argv);

void prove_retain(void *value);
void prove_release(void *value);
void prove_refinement_fail(const char *type_name, const char *rendered);

/* Copies a by-value struct to the heap so it can travel in a
   Prove_Result payload pointer. */
void *prove_box(const void *bytes, size_t size);

Prove_String *prove_string_from(const char *bytes, size_t len);
Prove_String *prove_string_concat(Prove_String *a, Prove_String *b);
bool prove_string_eq(Prove_String *a, Prove_String *b);
int64_t prove_string_len(Prove_String *s);
Prove_String *prove_string_trim(Prove_String *s);
Prove_String *prove_string_lower(Prove_String *s);
Prove_String *prove_string_upper(Prove_String *s);
bool prove_string_contains(Prove_String *haystack, Prove_String *needle);
Prove_List *prove_string_split(Prove_String *s, Prove_String *sep);
Prove_String *prove_string_join(Prove_List *parts, Prove_String *sep);
Prove_Result prove_string_parse_int(Prove_String *s);

Prove_String *prove_int_to_string(int64_t v);
Prove_String *prove_dec_to_string(double v);
Prove_String *prove_bool_to_string(bool v);

Prove_List *prove_list_new(void);
int64_t prove_list_len(Prove_List *xs);
Prove_List *prove_list_append_i64(Prove_List *xs, int64_t v);
Prove_List *prove_list_append_f64(Prove_List *xs, double v);
Prove_List *prove_list_append_ptr(Prove_List *xs, void *v);
int64_t prove_list_get_i64(Prove_List *xs, int64_t i);
double prove_list_get_f64(Prove_List *xs, int64_t i);
void *prove_list_get_ptr(Prove_List *xs, int64_t i);
Prove_List *prove_list_tail(Prove_List *xs);
Prove_Result prove_list_head_i64(Prove_List *xs);
Prove_Result prove_list_head_f64(Prove_List *xs);
Prove_Result prove_list_head_ptr(Prove_List *xs);
Prove_List *prove_range(int64_t lo, int64_t hi);
int64_t prove_list_sum_i64(Prove_List *xs);

Prove_List *prove_list_map_i64(Prove_List *xs, int64_t (*f)(int64_t));
Prove_List *prove_list_map_f64(Prove_List *xs, double (*f)(double));
Prove_List *prove_list_map_ptr(Prove_List *xs, void *(*f)(void *));
Prove_List *prove_list_filter_i64(Prove_List *xs, bool (*f)(int64_t));
Prove_List *prove_list_filter_f64(Prove_List *xs, bool (*f)(double));
Prove_List *prove_list_filter_ptr(Prove_List *xs, bool (*f)(void *));
int64_t prove_list_reduce_i64(Prove_List *xs, int64_t acc, int64_t (*f)(int64_t, int64_t));
double prove_list_reduce_f64(Prove_List *xs, double acc, double (*f)(double, double));
void *prove_list_reduce_ptr(Prove_List *xs, void *acc, void *(*f)(void *, void *));

void prove_println(Prove_String *s);
void prove_print(Prove_String *s);
void prove_eprintln(Prove_String *s);
Prove_Result prove_readln(void);
Prove_Result prove_read_file(Prove_String *path);
Prove_Result prove_write_file(Prove_String *path, Prove_String *contents);
Prove_Result prove_open(Prove_String *path);
Prove_Result prove_close(int64_t handle);
void prove_flush(void);
void prove_sleep(int64_t millis);

#endif /* PROVE_RUNTIME_ABI */
"#;

/// Result constructors the emitter leans on; small enough to live as
/// static helpers in each unit rather than in the runtime.
pub const RESULT_HELPERS: &str = r#"
static inline Prove_Result prove_ok_i(int64_t v) {
    Prove_Result r = { PROVE_OK, { .i = v }, 0 };
    return r;
}
static inline Prove_Result prove_ok_d(double v) {
    Prove_Result r = { PROVE_OK, { .d = v }, 0 };
    return r;
}
static inline Prove_Result prove_ok_p(void *v) {
    Prove_Result r = { PROVE_OK, { .ptr = v }, 0 };
    return r;
}
static inline Prove_Result prove_ok_unit(void) {
    Prove_Result r = { PROVE_OK, { .i = 0 }, 0 };
    return r;
}
static inline Prove_Result prove_err(Prove_String *message) {
    Prove_Result r = { PROVE_ERR, { .i = 0 }, 0 };
    r.err = message;
    return r;
}
static inline Prove_Result prove_none(void) {
    Prove_Result r = { PROVE_ERR, { .i = 0 }, 0 };
    return r;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_is_include_guarded() {
        assert!(RUNTIME_PRELUDE.contains("#ifndef PROVE_RUNTIME_ABI"));
        assert!(RUNTIME_PRELUDE.trim_end().ends_with("#endif /* PROVE_RUNTIME_ABI */"));
    }

    #[test]
    fn prelude_declares_the_abi_surface() {
        for name in [
            "Prove_Header",
            "Prove_String",
            "Prove_List",
            "Prove_Table",
            "Prove_Arena",
            "Prove_Result",
            "prove_runtime_init",
            "prove_runtime_cleanup",
            "prove_retain",
            "prove_release",
        ] {
            assert!(RUNTIME_PRELUDE.contains(name), "missing {name}");
        }
    }

    #[test]
    fn result_helpers_cover_all_payload_classes() {
        for name in ["prove_ok_i", "prove_ok_d", "prove_ok_p", "prove_ok_unit", "prove_err", "prove_none"] {
            assert!(RESULT_HELPERS.contains(name), "missing {name}");
        }
    }
}
