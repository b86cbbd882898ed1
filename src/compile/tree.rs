//! The type tree queried by the resolver and the statement compiler.
//!
//! [`ObjectTree`] is the narrow interface the compiler needs from whoever
//! owns the type hierarchy. [`MemoryTree`] is a complete in-memory
//! implementation seeded with the built-in types.

use crate::frontend::ast::{self, StatementKind, ValueTypes};
use crate::frontend::path::{PathKind, TypePath};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// An instance var declared on a type.
#[derive(Debug, Clone, PartialEq)]
pub struct VarInfo {
    /// Var name
    pub name: String,
    /// Declared type path
    pub ty: Option<TypePath>,
    /// Accepted value kinds
    pub types: ValueTypes,
    /// Declared `const`
    pub is_const: bool,
}

/// A global or static var.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVar {
    /// Stable id, also the index in the global table
    pub id: usize,
    /// Var name
    pub name: String,
    /// Type that declared the var, the root for true globals
    pub owner: TypePath,
    /// Declared type path
    pub ty: Option<TypePath>,
    /// Accepted value kinds
    pub types: ValueTypes,
    /// Initializer, evaluated in static scope
    pub value: Option<ast::Expr>,
}

/// Queries and the two write paths the compiler needs from the type tree.
pub trait ObjectTree {
    /// Check whether a type exists.
    fn type_exists(&self, path: &TypePath) -> bool;

    /// The type a type inherits from.
    fn parent_of(&self, path: &TypePath) -> Option<TypePath>;

    /// Look up an instance var on `owner` or one of its ancestors.
    fn field(&self, owner: &TypePath, name: &str) -> Option<&VarInfo>;

    /// Look up a global var visible from `owner`: its own statics, its
    /// ancestors' statics, then true globals.
    fn global_var(&self, owner: &TypePath, name: &str) -> Option<&GlobalVar>;

    /// Look up a global var by id.
    fn global_by_id(&self, id: usize) -> Option<&GlobalVar>;

    /// Check whether `owner` or one of its ancestors defines a proc.
    fn has_proc(&self, owner: &TypePath, name: &str) -> bool;

    /// Check whether a global proc exists.
    fn global_proc(&self, name: &str) -> bool;

    /// Record a global declared inside a proc body and return its id.
    fn register_global(
        &mut self,
        owner: &TypePath,
        name: &str,
        ty: Option<TypePath>,
        value: Option<ast::Expr>,
    ) -> usize;

    /// Add a proc to the verb list of its owning type.
    fn register_verb(&mut self, owner: &TypePath, proc_path: TypePath);

    /// Resolve `/base.search` by looking for `search` under `base` and then
    /// under each enclosing path.
    fn upward_search(&self, base: &TypePath, search: &TypePath) -> Option<TypePath> {
        let relative = TypePath::new(PathKind::Relative, search.elements.clone());
        let proc_marker = relative
            .find_element("proc")
            .or_else(|| relative.find_element("verb"));

        let mut current = Some(base.to_absolute());
        while let Some(path) = current {
            let candidate = path.combine(&relative);
            let found = match proc_marker {
                Some(index) => {
                    let owner = path.combine(&TypePath::new(PathKind::Relative, relative.elements[..index].to_vec()));
                    match candidate.last_element() {
                        Some(name) if index + 1 < relative.elements.len() => {
                            if owner.is_root() { self.global_proc(name) } else { self.has_proc(&owner, name) }
                        }
                        _ => false,
                    }
                }
                None => self.type_exists(&candidate),
            };
            if found {
                return Some(candidate);
            }
            current = path.parent();
        }
        None
    }
}

struct BuiltinType {
    path: &'static str,
    parent: Option<&'static str>,
    vars: &'static [&'static str],
    procs: &'static [&'static str],
}

static BUILTIN_TYPES: Lazy<Vec<BuiltinType>> = Lazy::new(|| {
    vec![
        BuiltinType { path: "/", parent: None, vars: &[], procs: &[] },
        BuiltinType {
            path: "/datum",
            parent: Some("/"),
            vars: &["type", "parent_type", "vars", "tag"],
            procs: &["New", "Del", "Topic", "Read", "Write"],
        },
        BuiltinType {
            path: "/atom",
            parent: Some("/datum"),
            vars: &[
                "name", "desc", "loc", "contents", "icon", "icon_state", "dir", "x", "y", "z",
                "density", "opacity", "invisibility", "layer", "verbs", "overlays", "underlays",
            ],
            procs: &["Enter", "Entered", "Exit", "Exited", "Click", "DblClick", "Stat"],
        },
        BuiltinType {
            path: "/atom/movable",
            parent: Some("/atom"),
            vars: &["step_x", "step_y", "bound_width", "bound_height"],
            procs: &["Move", "Bump", "Cross", "Crossed", "Uncross", "Uncrossed"],
        },
        BuiltinType { path: "/obj", parent: Some("/atom/movable"), vars: &[], procs: &[] },
        BuiltinType {
            path: "/mob",
            parent: Some("/atom/movable"),
            vars: &["key", "ckey", "client", "sight"],
            procs: &["Login", "Logout"],
        },
        BuiltinType { path: "/turf", parent: Some("/atom"), vars: &[], procs: &[] },
        BuiltinType { path: "/area", parent: Some("/atom"), vars: &[], procs: &[] },
        BuiltinType {
            path: "/list",
            parent: Some("/datum"),
            vars: &["len"],
            procs: &["Add", "Remove", "Find", "Copy", "Cut", "Insert", "Join", "Swap"],
        },
        BuiltinType {
            path: "/client",
            parent: Some("/datum"),
            vars: &["mob", "key", "ckey", "eye", "view", "statpanel"],
            procs: &["New", "Del", "Topic", "Command"],
        },
        BuiltinType {
            path: "/world",
            parent: Some("/datum"),
            vars: &["name", "log", "time", "timeofday", "maxx", "maxy", "maxz", "tick_lag", "cpu"],
            procs: &["New", "Del", "Reboot", "Export", "Import"],
        },
        BuiltinType { path: "/savefile", parent: Some("/datum"), vars: &["cd", "dir"], procs: &["Lock", "Unlock"] },
    ]
});

/// Vars the runtime declares but does not implement.
static UNIMPLEMENTED_VARS: &[(&str, &str)] = &[("/world", "cache_lifespan"), ("/client", "control_freak")];

static BUILTIN_GLOBAL_PROCS: &[&str] = &[
    "sleep", "text", "num2text", "text2num", "min", "max", "round", "rand", "ckey", "copytext",
    "findtext", "replacetext", "lowertext", "uppertext", "list2params", "params2list",
    "view", "range", "orange", "oview", "step", "walk", "flick", "isnum", "istext", "islist",
    "ispath", "ismob", "isobj", "isturf", "isarea", "isloc", "CRASH", "json_encode", "json_decode",
    "file", "fcopy", "fdel", "html_encode", "html_decode", "time2text", "winset", "winget", "shutdown",
];

#[derive(Debug, Clone, Default)]
struct TypeEntry {
    parent: Option<TypePath>,
    vars: HashMap<String, VarInfo>,
    procs: HashSet<String>,
    verbs: Vec<TypePath>,
}

/// In-memory type tree.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    types: HashMap<TypePath, TypeEntry>,
    globals: Vec<GlobalVar>,
    global_index: HashMap<(TypePath, String), usize>,
    global_procs: HashSet<String>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// A tree holding only the built-in types.
    pub fn new() -> Self {
        let mut tree = Self {
            types: HashMap::new(),
            globals: Vec::new(),
            global_index: HashMap::new(),
            global_procs: BUILTIN_GLOBAL_PROCS.iter().map(|s| s.to_string()).collect(),
        };

        for builtin in BUILTIN_TYPES.iter() {
            let path = TypePath::parse(builtin.path);
            let entry = TypeEntry {
                parent: builtin.parent.map(TypePath::parse),
                vars: builtin
                    .vars
                    .iter()
                    .map(|name| {
                        let var = VarInfo {
                            name: name.to_string(),
                            ty: None,
                            types: ValueTypes::ANYTHING,
                            is_const: false,
                        };
                        (name.to_string(), var)
                    })
                    .collect(),
                procs: builtin.procs.iter().map(|s| s.to_string()).collect(),
                verbs: Vec::new(),
            };
            tree.types.insert(path, entry);
        }

        for (owner, name) in UNIMPLEMENTED_VARS {
            tree.add_field(
                &TypePath::parse(owner),
                VarInfo {
                    name: name.to_string(),
                    ty: None,
                    types: ValueTypes::UNIMPLEMENTED,
                    is_const: false,
                },
            );
        }

        // `contents` and `verbs` are lists
        for owner in ["/atom"] {
            let owner = TypePath::parse(owner);
            for name in ["contents", "verbs", "overlays", "underlays"] {
                if let Some(var) = tree.types.get_mut(&owner).and_then(|t| t.vars.get_mut(name)) {
                    var.ty = Some(TypePath::parse("/list"));
                }
            }
        }
        tree
    }

    /// Build a tree from the declarations of a parsed file.
    pub fn from_file(file: &ast::File) -> Self {
        let mut tree = Self::new();
        tree.add_file(file);
        tree
    }

    /// Add every type, var and proc declared in `file`.
    pub fn add_file(&mut self, file: &ast::File) {
        for statement in file.flatten() {
            match &statement.kind {
                StatementKind::ObjectDefinition { path, .. } => {
                    let declares_member = path
                        .elements
                        .iter()
                        .any(|e| matches!(e.as_str(), "var" | "proc" | "verb"));
                    if !declares_member {
                        self.ensure_type(path);
                    }
                }
                StatementKind::VarDefinition(def) => {
                    self.ensure_type(&def.object_path);
                    if def.modifiers.is_static || def.object_path.is_root() {
                        self.add_global(&def.object_path, &def.name, def.ty.clone(), def.types, def.value.clone());
                    } else {
                        self.add_field(
                            &def.object_path,
                            VarInfo {
                                name: def.name.clone(),
                                ty: def.ty.clone(),
                                types: def.types,
                                is_const: def.modifiers.is_const,
                            },
                        );
                    }
                }
                StatementKind::ProcDefinition(def) => {
                    if def.object_path.is_root() {
                        self.global_procs.insert(def.name.clone());
                    } else {
                        self.ensure_type(&def.object_path);
                        if let Some(entry) = self.types.get_mut(&def.object_path.to_absolute()) {
                            entry.procs.insert(def.name.clone());
                        }
                    }
                }
                StatementKind::VarOverride { object_path, .. } => self.ensure_type(object_path),
                StatementKind::Aggregate(_) => {}
            }
        }
        log::debug!("type tree has {} types and {} globals", self.types.len(), self.globals.len());
    }

    /// Create a type and any missing ancestors.
    pub fn ensure_type(&mut self, path: &TypePath) {
        let path = path.to_absolute();
        if self.types.contains_key(&path) {
            return;
        }
        let parent = match path.elements.len() {
            0 => None,
            1 => Some(TypePath::parse("/datum")),
            _ => path.parent(),
        };
        if let Some(parent) = &parent {
            self.ensure_type(parent);
        }
        self.types.insert(path, TypeEntry { parent, ..TypeEntry::default() });
    }

    /// Declare an instance var.
    pub fn add_field(&mut self, owner: &TypePath, var: VarInfo) {
        self.ensure_type(owner);
        if let Some(entry) = self.types.get_mut(&owner.to_absolute()) {
            entry.vars.insert(var.name.clone(), var);
        }
    }

    /// Declare a proc on a type, or a global proc when `owner` is the root.
    pub fn add_proc(&mut self, owner: &TypePath, name: &str) {
        if owner.is_root() {
            self.global_procs.insert(name.to_string());
            return;
        }
        self.ensure_type(owner);
        if let Some(entry) = self.types.get_mut(&owner.to_absolute()) {
            entry.procs.insert(name.to_string());
        }
    }

    /// Declare a global var and return its id. Redeclaring returns the
    /// existing id.
    pub fn add_global(
        &mut self,
        owner: &TypePath,
        name: &str,
        ty: Option<TypePath>,
        types: ValueTypes,
        value: Option<ast::Expr>,
    ) -> usize {
        let key = (owner.to_absolute(), name.to_string());
        if let Some(&id) = self.global_index.get(&key) {
            return id;
        }
        let id = self.globals.len();
        self.globals.push(GlobalVar {
            id,
            name: name.to_string(),
            owner: key.0.clone(),
            ty,
            types,
            value,
        });
        self.global_index.insert(key, id);
        id
    }

    /// Every global var, by id.
    pub fn globals(&self) -> &[GlobalVar] {
        &self.globals
    }

    /// Verbs registered on a type.
    pub fn verbs(&self, owner: &TypePath) -> &[TypePath] {
        self.types
            .get(&owner.to_absolute())
            .map(|entry| entry.verbs.as_slice())
            .unwrap_or(&[])
    }

    fn ancestors(&self, path: &TypePath) -> impl Iterator<Item = (TypePath, &TypeEntry)> + '_ {
        let mut current = Some(path.to_absolute());
        std::iter::from_fn(move || {
            let path = current.take()?;
            let entry = self.types.get(&path)?;
            current = entry.parent.clone();
            Some((path, entry))
        })
    }
}

impl ObjectTree for MemoryTree {
    fn type_exists(&self, path: &TypePath) -> bool {
        self.types.contains_key(&path.to_absolute())
    }

    fn parent_of(&self, path: &TypePath) -> Option<TypePath> {
        self.types.get(&path.to_absolute())?.parent.clone()
    }

    fn field(&self, owner: &TypePath, name: &str) -> Option<&VarInfo> {
        self.ancestors(owner).find_map(|(_, entry)| entry.vars.get(name))
    }

    fn global_var(&self, owner: &TypePath, name: &str) -> Option<&GlobalVar> {
        let mut chain: Vec<TypePath> = self.ancestors(owner).map(|(path, _)| path).collect();
        if chain.last().map_or(true, |last| !last.is_root()) {
            chain.push(TypePath::root());
        }
        chain
            .into_iter()
            .find_map(|path| self.global_index.get(&(path, name.to_string())))
            .and_then(|&id| self.globals.get(id))
    }

    fn global_by_id(&self, id: usize) -> Option<&GlobalVar> {
        self.globals.get(id)
    }

    fn has_proc(&self, owner: &TypePath, name: &str) -> bool {
        self.ancestors(owner).any(|(_, entry)| entry.procs.contains(name))
    }

    fn global_proc(&self, name: &str) -> bool {
        self.global_procs.contains(name)
    }

    fn register_global(
        &mut self,
        owner: &TypePath,
        name: &str,
        ty: Option<TypePath>,
        value: Option<ast::Expr>,
    ) -> usize {
        self.add_global(owner, name, ty, ValueTypes::ANYTHING, value)
    }

    fn register_verb(&mut self, owner: &TypePath, proc_path: TypePath) {
        self.ensure_type(owner);
        if let Some(entry) = self.types.get_mut(&owner.to_absolute()) {
            if !entry.verbs.contains(&proc_path) {
                entry.verbs.push(proc_path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::Parser;
    use crate::utils::location::FileId;

    fn tree(source: &str) -> MemoryTree {
        let file = Parser::from_source(source, FileId(0)).parse_file();
        MemoryTree::from_file(&file)
    }

    #[test]
    fn test_builtin_hierarchy() {
        let tree = MemoryTree::new();
        assert_eq!(tree.parent_of(&TypePath::parse("/obj")), Some(TypePath::parse("/atom/movable")));
        assert!(tree.field(&TypePath::parse("/mob"), "name").is_some());
        assert!(tree.has_proc(&TypePath::parse("/obj"), "New"));
        assert!(tree.global_proc("sleep"));
        assert!(tree.field(&TypePath::parse("/world"), "cache_lifespan").is_some_and(|v| v.types.contains(ValueTypes::UNIMPLEMENTED)));
    }

    #[test]
    fn test_from_file() {
        let tree = tree("/obj/item\n\tvar/weight = 2\n\tvar/static/count = 0\n\tproc/use()\n\t\treturn\nvar/round_number = 1\n/proc/helper()\n\treturn\n");
        let item = TypePath::parse("/obj/item");
        assert!(tree.type_exists(&item));
        assert!(tree.field(&item, "weight").is_some());
        assert!(tree.field(&item, "count").is_none());
        assert!(tree.global_var(&item, "count").is_some());
        assert!(tree.global_var(&item, "round_number").is_some());
        assert!(tree.global_var(&TypePath::parse("/mob"), "count").is_none());
        assert!(!tree.has_proc(&TypePath::parse("/mob"), "use"));
        assert!(tree.has_proc(&item, "use"));
        assert!(tree.global_proc("helper"));
    }

    #[test]
    fn test_new_top_level_types_inherit_datum() {
        let mut tree = MemoryTree::new();
        tree.ensure_type(&TypePath::parse("/controller/air"));
        assert_eq!(tree.parent_of(&TypePath::parse("/controller")), Some(TypePath::parse("/datum")));
        assert!(tree.has_proc(&TypePath::parse("/controller/air"), "New"));
    }

    #[test]
    fn test_register_global_and_verb() {
        let mut tree = MemoryTree::new();
        let mob = TypePath::parse("/mob");
        let id = tree.register_global(&mob, "counter", None, None);
        assert_eq!(tree.global_by_id(id).map(|g| g.name.as_str()), Some("counter"));
        assert_eq!(tree.register_global(&mob, "counter", None, None), id);

        tree.register_verb(&mob, TypePath::parse("/mob/verb/say"));
        tree.register_verb(&mob, TypePath::parse("/mob/verb/say"));
        assert_eq!(tree.verbs(&mob).len(), 1);
    }

    #[test]
    fn test_upward_search() {
        let mut tree = MemoryTree::new();
        tree.ensure_type(&TypePath::parse("/obj/item/tool"));
        tree.add_proc(&TypePath::parse("/obj/item"), "use");

        let base = TypePath::parse("/obj/item/tool");
        assert_eq!(
            tree.upward_search(&base, &TypePath::parse("item")),
            Some(TypePath::parse("/obj/item"))
        );
        assert_eq!(
            tree.upward_search(&TypePath::parse("/obj/item"), &TypePath::parse("proc/use")),
            Some(TypePath::parse("/obj/item/proc/use"))
        );
        assert_eq!(tree.upward_search(&base, &TypePath::parse("nothing")), None);
    }
}
