//! Command-line front end for the model folder, installs and placeholders.

use std::{
    io::Write,
    path::PathBuf,
    sync::Arc,
};

use modelbay::{
    app_dirs,
    installer::{InstallRequest, ModelInstaller, spawn_install},
    logging,
    picker::{NativeFolderPicker, choose_model_root},
    placeholder::{GeneratorBackend, PlaceholderRequest},
    settings::{SettingsStore, ThemeMode},
};

#[derive(Debug, PartialEq)]
enum Command {
    ShowRoot,
    SetRoot(String),
    PickRoot,
    Validate,
    Theme {
        mode: Option<ThemeMode>,
        color: Option<String>,
    },
    List,
    Status(String),
    Install { url: String, key: String },
    Remove(String),
    Generate {
        request: PlaceholderRequest,
        out: Option<PathBuf>,
        backend: GeneratorBackend,
    },
    Help,
}

fn main() {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    if let Err(err) = try_main() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), String> {
    let command = parse_args(std::env::args().skip(1).collect())?;
    if command == Command::Help {
        println!("{}", help_text());
        return Ok(());
    }
    let store = Arc::new(SettingsStore::open().map_err(|err| err.to_string())?);
    run(command, store)
}

fn run(command: Command, store: Arc<SettingsStore>) -> Result<(), String> {
    let installer = ModelInstaller::new(Arc::clone(&store));
    match command {
        Command::ShowRoot => {
            let (root, configured) = store.try_model_root();
            if configured {
                println!("{root}");
            } else {
                println!("No model folder configured");
            }
        }
        Command::SetRoot(path) => {
            store.set_model_root_path(&path);
            println!("Model folder set to {}", store.model_root_path());
        }
        Command::PickRoot => match choose_model_root(&store, &NativeFolderPicker) {
            Some(root) => println!("Model folder set to {root}"),
            None => println!("No folder selected"),
        },
        Command::Validate => {
            let root = store.validate_model_root_path().map_err(|err| err.to_string())?;
            println!("Model folder OK: {}", root.display());
        }
        Command::Theme { mode, color } => {
            if let Some(mode) = mode {
                store.set_theme_mode(mode);
            }
            if let Some(color) = color {
                store.set_theme_color(Some(&color));
            }
            let color = store.theme_color().unwrap_or_else(|| "default".to_string());
            println!("Theme: {} ({color})", store.theme_mode());
        }
        Command::List => {
            let models = installer
                .list_installed_models()
                .map_err(|err| err.to_string())?;
            if models.is_empty() {
                println!("No models installed");
            }
            for model in models {
                println!("{model}");
            }
        }
        Command::Status(key) => {
            let installed = installer
                .is_model_installed(&key)
                .map_err(|err| err.to_string())?;
            let state = if installed { "installed" } else { "not installed" };
            println!("{key}: {state}");
        }
        Command::Install { url, key } => {
            let job = spawn_install(
                Arc::new(installer),
                InstallRequest {
                    url,
                    model_key: key,
                },
            );
            let result = job.wait_with(|percent| {
                eprint!("\rDownloading... {percent:>3}%");
                let _ = std::io::stderr().flush();
            });
            eprintln!();
            let path = result.map_err(|err| err.to_string())?;
            println!("Installed into {}", path.display());
        }
        Command::Remove(key) => {
            let removed = installer.remove_model(&key).map_err(|err| err.to_string())?;
            if removed {
                println!("Removed {key}");
            } else {
                println!("{key} is not installed");
            }
        }
        Command::Generate {
            request,
            out,
            backend,
        } => {
            let dir = match out {
                Some(dir) => dir,
                None => app_dirs::renders_dir().map_err(|err| err.to_string())?,
            };
            let path = backend
                .generate(&request, &dir)
                .map_err(|err| err.to_string())?;
            println!("{}", path.display());
        }
        Command::Help => println!("{}", help_text()),
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Command, String> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };
    if rest.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(Command::Help);
    }
    match name.as_str() {
        "root" => match rest {
            [] => Ok(Command::ShowRoot),
            [flag] if flag == "--pick" => Ok(Command::PickRoot),
            [path] => Ok(Command::SetRoot(path.clone())),
            _ => Err(usage_error("root takes at most one argument")),
        },
        "validate" => no_args(rest, Command::Validate),
        "theme" => parse_theme(rest),
        "list" => no_args(rest, Command::List),
        "status" => match rest {
            [key] => Ok(Command::Status(key.clone())),
            _ => Err(usage_error("status needs a model key")),
        },
        "install" => match rest {
            [url, key] => Ok(Command::Install {
                url: url.clone(),
                key: key.clone(),
            }),
            _ => Err(usage_error("install needs <url> <key>")),
        },
        "remove" => match rest {
            [key] => Ok(Command::Remove(key.clone())),
            _ => Err(usage_error("remove needs a model key")),
        },
        "generate" => parse_generate(rest),
        "help" | "-h" | "--help" => Ok(Command::Help),
        unknown => Err(usage_error(&format!("Unknown command '{unknown}'"))),
    }
}

fn parse_theme(args: &[String]) -> Result<Command, String> {
    let mut mode = None;
    let mut color = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--color" => color = Some(next_value(args, &mut i, "--color")?),
            value if mode.is_none() => mode = Some(value.parse::<ThemeMode>()?),
            unknown => return Err(usage_error(&format!("Unknown argument '{unknown}'"))),
        }
        i += 1;
    }
    Ok(Command::Theme { mode, color })
}

fn parse_generate(args: &[String]) -> Result<Command, String> {
    let mut prompt: Option<String> = None;
    let mut out = None;
    let mut size = None;
    let mut backend = GeneratorBackend::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--out" => out = Some(PathBuf::from(next_value(args, &mut i, "--out")?)),
            "--size" => size = Some(parse_size(&next_value(args, &mut i, "--size")?)?),
            "--backend" => backend = next_value(args, &mut i, "--backend")?.parse()?,
            value if prompt.is_none() => prompt = Some(value.to_string()),
            unknown => return Err(usage_error(&format!("Unknown argument '{unknown}'"))),
        }
        i += 1;
    }
    let prompt = prompt.ok_or_else(|| usage_error("generate needs a prompt"))?;
    let mut request = PlaceholderRequest::new(prompt);
    if let Some((width, height)) = size {
        request = request.with_size(width, height);
    }
    Ok(Command::Generate {
        request,
        out,
        backend,
    })
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let invalid = || format!("Invalid size '{value}', expected <width>x<height>");
    let (width, height) = value.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = width.trim().parse().map_err(|_| invalid())?;
    let height = height.trim().parse().map_err(|_| invalid())?;
    Ok((width, height))
}

fn no_args(args: &[String], command: Command) -> Result<Command, String> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(usage_error("This command takes no arguments"))
    }
}

fn next_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("Missing value for {flag}"))
}

fn usage_error(message: &str) -> String {
    format!("{message}\n\n{}", help_text())
}

fn help_text() -> String {
    [
        "Usage: modelbay <command>",
        "",
        "Commands:",
        "  root [<path>|--pick]        Show, set or pick the model folder",
        "  validate                    Check that the model folder exists",
        "  theme [system|light|dark] [--color <hex>]",
        "                              Show or change the theme",
        "  list                        List installed models",
        "  status <key>                Show whether a model is installed",
        "  install <url> <key>         Download a zip and unpack it as <key>",
        "  remove <key>                Delete an installed model",
        "  generate <prompt> [--out <dir>] [--size <w>x<h>] [--backend placeholder|onnx]",
        "                              Render an image for a prompt",
    ]
    .join("\n")
}
